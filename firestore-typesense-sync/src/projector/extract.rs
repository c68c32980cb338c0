//! Field extraction by dot-notation paths.
//!
//! Each selected path prunes a copy of the document down to the values it
//! reaches. A path crossing an array applies the rest of the path to every
//! element and keeps the results at their original positions, so paths
//! sharing an array ancestor merge element by element.

use std::collections::BTreeMap;

use firestore_typesense_sync_shared::{DocumentData, DocumentValue};

/// A pruned copy of part of a document.
#[derive(Debug, Clone, PartialEq)]
enum Selected {
    Value(DocumentValue),
    Map(BTreeMap<String, Selected>),
    /// Positional results; `None` where an element lacked the path.
    Array(Vec<Option<Selected>>),
}

impl Selected {
    fn merge(self, other: Selected) -> Selected {
        match (self, other) {
            (Selected::Map(mut left), Selected::Map(right)) => {
                for (key, value) in right {
                    let merged = match left.remove(&key) {
                        Some(existing) => existing.merge(value),
                        None => value,
                    };
                    left.insert(key, merged);
                }
                Selected::Map(left)
            }
            (Selected::Array(left), Selected::Array(right)) => {
                let len = left.len().max(right.len());
                let mut left = left.into_iter();
                let mut right = right.into_iter();
                let merged = (0..len)
                    .map(|_| match (left.next().flatten(), right.next().flatten()) {
                        (Some(a), Some(b)) => Some(a.merge(b)),
                        (a, b) => a.or(b),
                    })
                    .collect();
                Selected::Array(merged)
            }
            // A whole value already covers any part of itself.
            (whole @ Selected::Value(_), _) => whole,
            (_, whole) => whole,
        }
    }

    fn into_value(self) -> DocumentValue {
        match self {
            Selected::Value(value) => value,
            Selected::Map(map) => DocumentValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, value.into_value()))
                    .collect(),
            ),
            Selected::Array(items) => {
                DocumentValue::Array(items.into_iter().flatten().map(Selected::into_value).collect())
            }
        }
    }
}

fn select(value: &DocumentValue, segments: &[&str]) -> Option<Selected> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(Selected::Value(value.clone()));
    };
    match value {
        DocumentValue::Map(map) => {
            let child = select(map.get(*head)?, rest)?;
            Some(Selected::Map(BTreeMap::from([(head.to_string(), child)])))
        }
        DocumentValue::Array(items) => {
            let results: Vec<Option<Selected>> =
                items.iter().map(|item| select(item, segments)).collect();
            results
                .iter()
                .any(Option::is_some)
                .then_some(Selected::Array(results))
        }
        _ => None,
    }
}

/// Extract the given paths from a document.
///
/// Missing paths emit nothing. An empty path list returns the whole document.
///
/// # Example
///
/// ```
/// use firestore_typesense_sync::projector::extract_fields;
/// use firestore_typesense_sync_shared::{data_from_json, data_to_json};
/// use serde_json::json;
///
/// let data = data_from_json(json!({
///     "title": "Dune",
///     "comments": [{"author": "a", "text": "x"}, {"text": "y"}],
///     "country": "USA",
/// }));
/// let extracted = extract_fields(&data, ["title", "comments.author"]);
/// assert_eq!(
///     json!(data_to_json(&extracted)),
///     json!({"title": "Dune", "comments": [{"author": "a"}]})
/// );
/// ```
pub fn extract_fields<'a, I>(data: &DocumentData, paths: I) -> DocumentData
where
    I: IntoIterator<Item = &'a str>,
{
    let root = DocumentValue::Map(data.clone());
    let mut selection: Option<Selected> = None;
    let mut any_path = false;

    for path in paths {
        any_path = true;
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            continue;
        }
        if let Some(selected) = select(&root, &segments) {
            selection = Some(match selection {
                Some(existing) => existing.merge(selected),
                None => selected,
            });
        }
    }

    if !any_path {
        return data.clone();
    }
    match selection.map(Selected::into_value) {
        Some(DocumentValue::Map(map)) => map,
        _ => DocumentData::new(),
    }
}

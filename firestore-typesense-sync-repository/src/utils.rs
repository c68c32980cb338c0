//! Utility functions shared by the backend implementations.

use firestore_typesense_sync_shared::{DocumentData, DocumentValue, IndexableRecord};
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::{ImportItemResult, ImportSummary};

/// Resolve a dotted field path through nested maps.
pub fn lookup_field<'a>(data: &'a DocumentData, field: &str) -> Option<&'a DocumentValue> {
    let mut segments = field.split('.');
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = current.as_map()?.get(segment)?;
    }
    Some(current)
}

/// Build the `filter_by` expression matching any of `ids`.
///
/// Each id is wrapped in backticks so commas, brackets and spaces inside an
/// id stay part of it.
///
/// # Example
///
/// ```
/// use firestore_typesense_sync_repository::utils::id_filter;
///
/// let ids = vec!["a".to_string(), "b".to_string()];
/// assert_eq!(id_filter(&ids), "id:[`a`,`b`]");
/// ```
pub fn id_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("`{}`", id.replace('`', "\\`")))
        .collect();
    format!("id:[{}]", quoted.join(","))
}

/// Encode records as newline-delimited JSON for the import endpoint.
pub fn to_jsonl(records: &[IndexableRecord]) -> Result<String, SearchIndexError> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SearchIndexError::serialization(e.to_string()))?;
    Ok(lines.join("\n"))
}

/// Parse newline-delimited JSON, skipping blank lines.
pub fn parse_jsonl(body: &str) -> Result<Vec<Value>, SearchIndexError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| SearchIndexError::parse(e.to_string())))
        .collect()
}

/// Parse an import response into per-record results.
///
/// The engine answers with one JSON line per submitted record, in submission
/// order. A line without an `id` takes the id of the record at its position.
///
/// # Arguments
///
/// * `body` - The raw response body
/// * `records` - The records that were submitted
///
/// # Returns
///
/// * `Ok(ImportSummary)` - Per-record results
/// * `Err(SearchIndexError)` - If a line is not valid JSON or the line count
///   doesn't match the submission
pub fn parse_import_response(
    body: &str,
    records: &[IndexableRecord],
) -> Result<ImportSummary, SearchIndexError> {
    let lines = parse_jsonl(body)?;
    if lines.len() != records.len() {
        return Err(SearchIndexError::parse(format!(
            "Import returned {} results for {} documents",
            lines.len(),
            records.len()
        )));
    }

    let results = lines
        .into_iter()
        .zip(records)
        .map(|(line, record)| {
            let success = line.get("success").and_then(Value::as_bool).unwrap_or(false);
            let id = line
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_else(|| record.id())
                .to_string();
            ImportItemResult {
                id,
                success,
                error: line
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                document: line.get("document").map(|d| match d {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
            }
        })
        .collect();

    Ok(ImportSummary::from_results(results))
}

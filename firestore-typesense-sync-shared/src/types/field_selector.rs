//! Field selection for projection.

/// A selected field path with its name in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedField {
    /// Dot-notation path in the source document.
    pub path: String,
    /// Output key in the indexed record.
    pub target: String,
}

/// The set of field paths to project. Empty means "project everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    fields: Vec<SelectedField>,
}

impl FieldSelector {
    /// A selector that projects every field.
    pub fn all() -> Self {
        Self::default()
    }

    /// Select the given paths without renaming. Duplicates are dropped.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selector = Self::default();
        for path in paths {
            let path = path.into();
            selector.push(path.clone(), path);
        }
        selector
    }

    /// Parse a comma-separated field list with optional `source=target`
    /// renames.
    ///
    /// # Example
    ///
    /// ```
    /// use firestore_typesense_sync_shared::FieldSelector;
    ///
    /// let selector = FieldSelector::parse("foo, baz = qux, bar , ");
    /// let pairs: Vec<(&str, &str)> = selector
    ///     .fields()
    ///     .iter()
    ///     .map(|f| (f.path.as_str(), f.target.as_str()))
    ///     .collect();
    /// assert_eq!(pairs, vec![("foo", "foo"), ("baz", "qux"), ("bar", "bar")]);
    /// ```
    pub fn parse(raw: &str) -> Self {
        let mut selector = Self::default();
        for entry in raw.split(',') {
            let mut parts = entry.splitn(2, '=').map(str::trim);
            let path = parts.next().unwrap_or_default();
            if path.is_empty() {
                continue;
            }
            let target = parts.next().filter(|t| !t.is_empty()).unwrap_or(path);
            selector.push(path.to_string(), target.to_string());
        }
        selector
    }

    fn push(&mut self, path: String, target: String) {
        if !self.fields.iter().any(|f| f.path == path) {
            self.fields.push(SelectedField { path, target });
        }
    }

    pub fn fields(&self) -> &[SelectedField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Source paths, in selection order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.path.as_str())
    }

    /// Fields whose output key differs from their source path.
    pub fn renames(&self) -> impl Iterator<Item = &SelectedField> {
        self.fields.iter().filter(|f| f.path != f.target)
    }
}

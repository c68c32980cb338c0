//! Path patterns with named placeholders.
//!
//! A pattern such as `users/{userId}/books` matches concrete document paths
//! living under any user, and binds `userId` to the matched segment.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Placeholder name → literal segment value matched at a concrete path.
pub type PathBinding = BTreeMap<String, String>;

/// Errors from parsing or matching paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A path or pattern argument is empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A pattern is malformed (e.g. a placeholder name repeats).
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed `/`-delimited path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern. Empty segments are ignored.
    ///
    /// # Returns
    ///
    /// * `Ok(PathPattern)` - The parsed pattern
    /// * `Err(PathError::InvalidInput)` - If the pattern is empty
    /// * `Err(PathError::InvalidPattern)` - If a placeholder name repeats
    pub fn parse(pattern: &str) -> Result<Self, PathError> {
        if pattern.trim().is_empty() {
            return Err(PathError::InvalidInput(
                "Invalid selector: Selector must be a non-empty string.".to_string(),
            ));
        }

        let mut segments = Vec::new();
        for segment in pattern.split('/').filter(|s| !s.is_empty()) {
            match placeholder_name(segment) {
                Some(name) => {
                    let duplicate = segments
                        .iter()
                        .any(|s| matches!(s, Segment::Placeholder(existing) if existing == name));
                    if duplicate {
                        return Err(PathError::InvalidPattern(format!(
                            "Placeholder {{{}}} appears more than once in {}",
                            name, pattern
                        )));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                None => segments.push(Segment::Literal(segment.to_string())),
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Placeholder names with their segment index, in pattern order.
    pub fn placeholders(&self) -> Vec<(&str, usize)> {
        self.segments
            .iter()
            .enumerate()
            .filter_map(|(index, segment)| match segment {
                Segment::Placeholder(name) => Some((name.as_str(), index)),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
    }

    /// Number of non-empty segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether documents under this pattern span many parent collections and
    /// must be read through a collection-group query.
    pub fn is_collection_group(&self) -> bool {
        self.segments.len() > 1 && self.has_placeholders()
    }

    /// The final segment when it is a literal (the collection id).
    pub fn last_literal(&self) -> Option<&str> {
        match self.segments.last() {
            Some(Segment::Literal(literal)) => Some(literal),
            _ => None,
        }
    }

    /// The pattern as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a concrete path against this pattern.
    ///
    /// Only the first `self.len()` segments of the path are compared; extra
    /// trailing segments (such as the document id) are allowed. Returns
    /// `None` when the path is shorter than the pattern or a literal segment
    /// differs.
    pub fn matches(&self, path: &str) -> Option<PathBinding> {
        let concrete: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if concrete.len() < self.segments.len() {
            return None;
        }

        let mut binding = PathBinding::new();
        for (segment, value) in self.segments.iter().zip(concrete) {
            match segment {
                Segment::Literal(literal) if literal != value => return None,
                Segment::Literal(_) => {}
                Segment::Placeholder(name) => {
                    binding.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(binding)
    }

    /// Match a document path that sits directly inside a collection matching
    /// this pattern.
    ///
    /// Unlike [`PathPattern::matches`], documents of deeper subcollections are
    /// rejected.
    pub fn matches_document(&self, path: &str) -> Option<PathBinding> {
        let depth = path.split('/').filter(|s| !s.is_empty()).count();
        if depth != self.segments.len() + 1 {
            return None;
        }
        self.matches(path)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// `{name}` → `name`, when `name` is a non-empty word.
fn placeholder_name(segment: &str) -> Option<&str> {
    let name = segment.strip_prefix('{')?.strip_suffix('}')?;
    let is_word = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    is_word.then_some(name)
}

/// Parse a pattern into its placeholder names and segment indices.
pub fn parse_pattern(pattern: &str) -> Result<Vec<(String, usize)>, PathError> {
    let parsed = PathPattern::parse(pattern)?;
    Ok(parsed
        .placeholders()
        .into_iter()
        .map(|(name, index)| (name.to_string(), index))
        .collect())
}

/// Match `path` against `pattern`, extracting placeholder bindings.
///
/// # Returns
///
/// * `Ok(Some(binding))` - The path matches
/// * `Ok(None)` - The path is too short or a literal segment differs
/// * `Err(PathError)` - If either argument is empty or the pattern is invalid
pub fn match_path(path: &str, pattern: &str) -> Result<Option<PathBinding>, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::InvalidInput(
            "Invalid path: Path must be a non-empty string.".to_string(),
        ));
    }
    Ok(PathPattern::parse(pattern)?.matches(path))
}

//! Dotted field paths and nested writes into a property tree.
//!
//! A [`FieldPath`] such as `"address.city"` addresses a value inside nested
//! documents. Paths and stored keys share the store's reserved syntax rules:
//! no empty segments, no `$` prefix, and no `.` inside a single key.
//!
//! # Example
//!
//! ```ignore
//! use bson::{doc, Bson};
//! use docmodel_core::path::{FieldPath, set_path, get_path};
//!
//! let mut tree = doc! {};
//! let path = FieldPath::parse("address.city")?;
//! set_path(&mut tree, &path, Bson::from("Mos Eisley"));
//!
//! assert_eq!(get_path(&tree, &path), Some(&Bson::from("Mos Eisley")));
//! ```

use bson::{Bson, Document};
use std::{fmt, str::FromStr};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Maximum number of nested container levels a stored value (or path) may have.
pub const MAX_NESTING_DEPTH: usize = 10;

/// A validated, dotted path into a property tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses and validates a dotted path.
    ///
    /// Surrounding whitespace is trimmed. Each `.`-separated segment must be a
    /// valid field name (see [`check_field_name`]).
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidArgument`] for an empty path, a path
    /// starting with `$` or any blank segment, and
    /// [`DocumentStoreError::TooDeeplyNested`] for more than [`MAX_NESTING_DEPTH`] segments.
    pub fn parse(path: &str) -> DocumentStoreResult<Self> {
        let trimmed = path.trim();

        if trimmed.is_empty() {
            return Err(DocumentStoreError::InvalidArgument(
                "field path must not be empty".to_string(),
            ));
        }
        if trimmed.starts_with('$') {
            return Err(DocumentStoreError::InvalidArgument(format!(
                "field path {trimmed:?} must not start with '$'"
            )));
        }

        let segments = trimmed
            .split('.')
            .map(|segment| check_field_name(segment).map(|_| segment.to_string()))
            .collect::<DocumentStoreResult<Vec<_>>>()
            .map_err(|_| {
                DocumentStoreError::InvalidArgument(format!(
                    "field path {trimmed:?} contains an invalid segment"
                ))
            })?;

        if segments.len() > MAX_NESTING_DEPTH {
            return Err(DocumentStoreError::TooDeeplyNested {
                path: trimmed.to_string(),
                limit: MAX_NESTING_DEPTH,
            });
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments in the path.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the dotted path made of the first `len` segments.
    pub fn prefix(&self, len: usize) -> String {
        self.segments[..len.min(self.segments.len())].join(".")
    }

    /// Iterates over every prefix from the first segment to the full path.
    pub fn prefixes(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.segments.len()).map(|len| self.prefix(len))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FieldPath {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(s)
    }
}

/// Returns `true` if `path` lies strictly below `ancestor` (`"a.b"` is below `"a"`, `"ab"` is not).
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}

/// Validates a single stored key.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidArgument`] if the name is blank, starts
/// with `$` or contains `.`.
pub fn check_field_name(name: &str) -> DocumentStoreResult<()> {
    if name.trim().is_empty() {
        return Err(DocumentStoreError::InvalidArgument(
            "field names must not be blank".to_string(),
        ));
    }
    if name.starts_with('$') {
        return Err(DocumentStoreError::InvalidArgument(format!(
            "field name {name:?} must not start with '$'"
        )));
    }
    if name.contains('.') {
        return Err(DocumentStoreError::InvalidArgument(format!(
            "field name {name:?} must not contain '.'"
        )));
    }

    Ok(())
}

/// Recursively validates every key inside a value about to be stored.
///
/// Documents and arrays each count as one nesting level. A value with exactly
/// [`MAX_NESTING_DEPTH`] levels passes; one more level fails.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidArgument`] for a reserved key and
/// [`DocumentStoreError::TooDeeplyNested`] past the depth limit.
pub fn check_nested_field_names(value: &Bson) -> DocumentStoreResult<()> {
    check_nested(value, "", 0)
}

/// Same as [`check_nested_field_names`] for a top-level document.
pub fn check_document_field_names(document: &Document) -> DocumentStoreResult<()> {
    check_document(document, "", 0)
}

fn check_nested(value: &Bson, path: &str, depth: usize) -> DocumentStoreResult<()> {
    match value {
        Bson::Document(document) => check_document(document, path, depth),
        Bson::Array(items) => {
            ensure_depth(path, depth)?;
            for (index, item) in items.iter().enumerate() {
                check_nested(item, &join(path, &index.to_string()), depth + 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_document(document: &Document, path: &str, depth: usize) -> DocumentStoreResult<()> {
    ensure_depth(path, depth)?;
    for (key, child) in document {
        check_field_name(key)?;
        check_nested(child, &join(path, key), depth + 1)?;
    }
    Ok(())
}

fn ensure_depth(path: &str, depth: usize) -> DocumentStoreResult<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(DocumentStoreError::TooDeeplyNested {
            path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
            limit: MAX_NESTING_DEPTH,
        });
    }
    Ok(())
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Result of [`set_path`].
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    /// The value previously stored at the exact path, if any.
    pub previous: Option<Bson>,
    /// Number of leading segments of the shortest prefix the write created or
    /// replaced. Equals the path length when every intermediate already existed
    /// as a document.
    pub boundary: usize,
}

/// Reads the value at `path`, if every intermediate is a document.
pub fn get_path<'a>(document: &'a Document, path: &FieldPath) -> Option<&'a Bson> {
    let (last, parents) = path.segments.split_last()?;
    let mut current = document;

    for segment in parents {
        current = current.get(segment)?.as_document()?;
    }

    current.get(last)
}

/// Writes `value` at `path`, creating intermediate documents as needed.
///
/// Any intermediate that is not a document (a scalar or an array in the way)
/// is replaced by an empty document.
pub fn set_path(document: &mut Document, path: &FieldPath, value: Bson) -> SetOutcome {
    let Some((last, parents)) = path.segments.split_last() else {
        return SetOutcome { previous: None, boundary: 0 };
    };
    let mut boundary = path.len();
    let mut current = document;

    for (depth, segment) in parents.iter().enumerate() {
        if !matches!(current.get(segment), Some(Bson::Document(_))) {
            boundary = boundary.min(depth + 1);
            current.insert(segment.clone(), Document::new());
        }

        current = match current.get_mut(segment) {
            Some(Bson::Document(next)) => next,
            _ => unreachable!("intermediate segment holds a document"),
        };
    }

    SetOutcome {
        previous: current.insert(last.clone(), value),
        boundary,
    }
}

/// Removes the value at `path`, returning it. Missing intermediates are a no-op.
pub fn unset_path(document: &mut Document, path: &FieldPath) -> Option<Bson> {
    let (last, parents) = path.segments.split_last()?;
    let mut current = document;

    for segment in parents {
        current = match current.get_mut(segment) {
            Some(Bson::Document(next)) => next,
            _ => return None,
        };
    }

    current.remove(last)
}

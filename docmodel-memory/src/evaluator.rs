//! Filter expression evaluation against stored documents.
//!
//! Field names are dotted paths into nested documents. A missing field reads as
//! null: it matches `Eq(null)` and `Ne(value)` but no ordering or string operator.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docmodel_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    path::{self, FieldPath},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Comparable view of a BSON value. Numeric types are normalized to `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other value; compared by exact equality only.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Reads a dotted path from a document. Malformed paths read as missing.
pub(crate) fn lookup<'a>(document: &'a Document, field: &str) -> Option<&'a Bson> {
    FieldPath::parse(field)
        .ok()
        .and_then(|path| path::get_path(document, &path))
}

/// Sort key for a dotted path; missing fields sort as null.
pub(crate) fn sort_key<'a>(document: &'a Document, field: &str) -> Comparable<'a> {
    lookup(document, field)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns `true` if `document` matches the optional filter.
    pub fn matches(document: &Document, filter: Option<&Expr>) -> bool {
        filter.is_none_or(|expr| {
            DocumentEvaluator::new(document)
                .evaluate(expr)
                .unwrap_or(false)
        })
    }
}

fn contains(haystack: &Comparable<'_>, needle: &Comparable<'_>) -> Option<bool> {
    match (haystack, needle) {
        (Comparable::Array(array), needle) => Some(array.iter().any(|item| item == needle)),
        (Comparable::String(left), Comparable::String(right)) => Some(left.contains(right)),
        _ => None,
    }
}

fn any_of(field_value: &Comparable<'_>, value: &Comparable<'_>) -> bool {
    match (field_value, value) {
        (Comparable::Array(array), Comparable::Array(values)) => {
            values.iter().any(|val| array.iter().any(|item| item == val))
        }
        (Comparable::Array(array), single_value) => array.iter().any(|item| item == single_value),
        (single_value, Comparable::Array(values)) => values.iter().any(|val| val == single_value),
        _ => false,
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let value = Comparable::from(value);
        let field_value = match lookup(self.document, field) {
            Some(field_value) => Comparable::from(field_value),
            None => {
                return Ok(match op {
                    FieldOp::Eq => value == Comparable::Null,
                    FieldOp::Ne => value != Comparable::Null,
                    FieldOp::NotContains | FieldOp::NoneOf => true,
                    _ => false,
                });
            }
        };

        Ok(match op {
            FieldOp::Eq => field_value == value,
            FieldOp::Ne => field_value != value,
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match field_value.partial_cmp(&value) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
            FieldOp::Contains => contains(&field_value, &value).unwrap_or(false),
            FieldOp::NotContains => !contains(&field_value, &value).unwrap_or(false),
            FieldOp::StartsWith => match (field_value, value) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (field_value, value) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf => any_of(&field_value, &value),
            FieldOp::NoneOf => !any_of(&field_value, &value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::query::Filter;

    fn matches(document: &Document, expr: Expr) -> bool {
        DocumentEvaluator::matches(document, Some(&expr))
    }

    #[test]
    fn nested_paths_are_followed() {
        let jedi = doc! { "name": "Luke", "home": { "planet": "Tatooine" } };

        assert!(matches(&jedi, Filter::eq("home.planet", "Tatooine")));
        assert!(matches(&jedi, Filter::exists("home.planet")));
        assert!(!matches(&jedi, Filter::exists("home.moon")));
    }

    #[test]
    fn missing_fields_read_as_null() {
        let jedi = doc! { "name": "Yoda" };

        assert!(matches(&jedi, Filter::eq("deleted_at", Bson::Null)));
        assert!(matches(&jedi, Filter::ne("rank", "padawan")));
        assert!(!matches(&jedi, Filter::gt("age", 10)));
        assert!(!matches(&doc! { "deleted_at": 5 }, Filter::eq("deleted_at", Bson::Null)));
    }

    #[test]
    fn object_ids_compare_by_value() {
        let id = ObjectId::new();
        let jedi = doc! { "_id": id };

        assert!(matches(&jedi, Filter::id(id)));
        assert!(!matches(&jedi, Filter::id(ObjectId::new())));
    }

    #[test]
    fn set_operators() {
        let jedi = doc! { "name": "Obi-Wan", "padawans": ["Anakin", "Luke"] };

        assert!(matches(&jedi, Filter::contains("padawans", "Luke")));
        assert!(matches(&jedi, Filter::not_contains("padawans", "Ahsoka")));
        assert!(matches(&jedi, Filter::any_of("name", vec!["Obi-Wan", "Qui-Gon"])));
        assert!(matches(&jedi, Filter::none_of("padawans", vec!["Rey"])));
        assert!(matches(&jedi, Filter::starts_with("name", "Obi")));
    }
}

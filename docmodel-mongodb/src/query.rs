//! Query translation from docmodel filter expressions to MongoDB query syntax.

use bson::{Document, Bson, doc};

use docmodel_core::{
    query::{QueryVisitor, Expr, FieldOp},
    error::DocumentStoreError,
};

/// Escapes regular expression metacharacters so `value` matches literally.
fn escape_regex(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

fn as_list(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        other => Bson::Array(vec![other.clone()]),
    }
}

/// Translates filter expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": escape_regex(s) },
                    other => doc! { "$elemMatch": { "$eq": other } },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": escape_regex(s) } },
                    other => doc! { "$ne": other },
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", escape_regex(s)) },
                    _ => return Err(DocumentStoreError::InvalidArgument("StartsWith operator requires a string value".to_string())),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", escape_regex(s)) },
                    _ => return Err(DocumentStoreError::InvalidArgument("EndsWith operator requires a string value".to_string())),
                },
                FieldOp::AnyOf => doc! { "$in": as_list(value) },
                FieldOp::NoneOf => doc! { "$nin": as_list(value) },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::query::Filter;

    #[test]
    fn soft_delete_scope_translates_to_null_equality() {
        let expr = Filter::eq("deleted_at", Bson::Null).and(Filter::id(7));

        assert_eq!(
            MongoQueryTranslator.visit_expr(&expr).unwrap(),
            doc! { "$and": [{ "deleted_at": { "$eq": Bson::Null } }, { "_id": { "$eq": 7 } }] }
        );
    }

    #[test]
    fn string_operators_match_literally() {
        assert_eq!(
            MongoQueryTranslator.visit_expr(&Filter::starts_with("name", "Obi-Wan (Ben)")).unwrap(),
            doc! { "name": { "$regex": "^Obi-Wan \\(Ben\\)" } }
        );
    }

    #[test]
    fn negation_uses_nor() {
        assert_eq!(
            MongoQueryTranslator.visit_expr(&Filter::eq("side", "dark").not()).unwrap(),
            doc! { "$nor": [{ "side": { "$eq": "dark" } }] }
        );
        assert_eq!(
            MongoQueryTranslator.visit_expr(&Filter::any_of("rank", "master")).unwrap(),
            doc! { "rank": { "$in": ["master"] } }
        );
    }
}

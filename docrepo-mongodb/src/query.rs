//! Query translation from docrepo expressions to MongoDB query syntax.
//!
//! This module translates docrepo's abstract query expressions into
//! MongoDB BSON documents for execution by the MongoDB query engine.
//! Field names are sanitized on the way through; values are already in wire form.

use bson::{Document, Bson, doc};

use docrepo_core::{
    query::{QueryVisitor, Expr, FieldOp},
    error::DocumentStoreError,
    filter::Filter,
};

use crate::sanitizer::KeySanitizer;


/// Translates docrepo query expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an equality filter into a MongoDB filter document.
    pub(crate) fn translate_filter(filter: &Filter) -> Document {
        KeySanitizer::sanitize_document(filter.document().clone())
    }

    fn visit_all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, DocumentStoreError> {
        exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect()
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // MongoDB rejects an empty $and; an empty conjunction matches everything.
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! { "$and": self.visit_all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // An empty disjunction matches nothing.
        if exprs.is_empty() {
            return Ok(doc! { "_id": { "$in": [] } });
        }

        Ok(doc! { "$or": self.visit_all(exprs)? })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // $not is only valid on a field; $nor negates a whole expression.
        let negated = self.visit_expr(expr)?;

        Ok(doc! { "$nor": [negated] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        let field = KeySanitizer::sanitize_key(field);

        Ok(doc! { field: { "$exists": should_exist } })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let operator = match op {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::AnyOf => "$in",
            FieldOp::NoneOf => "$nin",
        };

        if matches!(op, FieldOp::AnyOf | FieldOp::NoneOf) && !matches!(value, Bson::Array(_)) {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "{operator} on {field} requires an array value"
            )));
        }

        let field = KeySanitizer::sanitize_key(field);

        Ok(doc! { field: { operator: value.clone() } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrepo_core::query::Predicate;

    fn translate(expr: Expr) -> Document {
        MongoQueryTranslator.visit_expr(&expr).unwrap()
    }

    #[test]
    fn field_operators() {
        assert_eq!(translate(Predicate::gte("age", 18)), doc! { "age": { "$gte": 18 } });
        assert_eq!(
            translate(Predicate::none_of("tag", ["a", "b"])),
            doc! { "tag": { "$nin": ["a", "b"] } }
        );
    }

    #[test]
    fn logical_operators() {
        let expr = Predicate::eq("a", 1)
            .or(Predicate::exists("b"))
            .not();

        assert_eq!(
            translate(expr),
            doc! { "$nor": [{ "$or": [{ "a": { "$eq": 1 } }, { "b": { "$exists": true } }] }] }
        );
    }

    #[test]
    fn empty_conjunction_matches_everything() {
        assert_eq!(translate(Predicate::and(Vec::new())), doc! {});
    }

    #[test]
    fn field_names_are_sanitized() {
        assert_eq!(
            translate(Predicate::eq("price.usd", "$5")),
            doc! { "price__dot__usd": { "$eq": "$5" } }
        );
    }

    #[test]
    fn membership_requires_an_array() {
        let expr = Expr::field("a".to_string(), FieldOp::AnyOf, Bson::Int32(1));

        assert!(MongoQueryTranslator.visit_expr(&expr).is_err());
    }
}

//! Translation of field-value predicates into encoded filters.
//!
//! Every value passes through the same [`FieldKind::encode`](crate::codec::FieldKind::encode)
//! used on writes, so a value read back from a previously decoded entity, such as an
//! autogenerated key or `updated_at`, can be used directly as a lookup value and will match
//! its stored encoding.

use bson::{Bson, Document};

use crate::{
    codec::FieldKind,
    descriptor::EntityDescriptor,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Query, QueryVisitor, Sort},
};

/// An ordered mapping from entity field names to desired values.
///
/// Setting the same field twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValues {
    values: Document,
}

impl FieldValues {
    /// Creates an empty mapping, which matches every entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field to match, returning the mapping.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.insert(field, value);
        self
    }

    /// Adds a field to match in place, replacing any earlier value for it.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Bson>) {
        self.values.insert(field.into(), value.into());
    }

    /// Iterates over the field-value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bson)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Bson>> FromIterator<(K, V)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(FieldValues::new(), |values, (field, value)| values.with(field, value))
    }
}

/// An encoded filter: wire field names mapped to wire values, all of which must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    document: Document,
}

impl Filter {
    /// Creates a filter that matches every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already-encoded document.
    pub fn from_document(document: Document) -> Self {
        Self { document }
    }

    /// Returns the encoded field-value pairs.
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    /// Lowers this filter to an equality conjunction.
    pub fn to_expr(&self) -> Expr {
        Expr::And(
            self.document
                .iter()
                .map(|(field, value)| Expr::field(field.clone(), FieldOp::Eq, value.clone()))
                .collect(),
        )
    }
}

/// Encodes a field-value mapping into a [`Filter`] for the descriptor's collection.
///
/// # Errors
///
/// Returns [`DocumentStoreError::UnknownField`] if a field is not declared, or
/// [`DocumentStoreError::TypeMismatch`] if a value cannot be encoded as its field's kind.
pub fn translate(
    descriptor: &EntityDescriptor,
    values: &FieldValues,
) -> DocumentStoreResult<Filter> {
    let mut document = Document::new();

    for (field, value) in values.iter() {
        let kind = known_kind(descriptor, field)?;
        document.insert(descriptor.wire_name(field), kind.encode(field, value.clone())?);
    }

    Ok(Filter { document })
}

/// Builds the filter selecting a single entity by primary key.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Precondition`] if the entity type has no primary key.
pub fn key_filter(descriptor: &EntityDescriptor, key: Bson) -> DocumentStoreResult<Filter> {
    let pk = descriptor
        .primary_key()
        .ok_or_else(|| {
            DocumentStoreError::Precondition(format!(
                "entities in {} have no primary key",
                descriptor.collection()
            ))
        })?;

    translate(descriptor, &FieldValues::new().with(pk.name.clone(), key))
}

/// Encodes every value and field name in a typed query.
///
/// # Errors
///
/// Returns [`DocumentStoreError::UnknownField`] for undeclared filter or sort fields.
pub fn translate_query(descriptor: &EntityDescriptor, query: Query) -> DocumentStoreResult<Query> {
    let filter = match &query.filter {
        Some(expr) => Some(PredicateEncoder { descriptor }.visit_expr(expr)?),
        None => None,
    };

    let sort = match query.sort {
        Some(sort) => {
            known_kind(descriptor, &sort.field)?;
            Some(Sort {
                field: descriptor.wire_name(&sort.field).to_string(),
                direction: sort.direction,
            })
        }
        None => None,
    };

    Ok(Query { filter, sort, ..query })
}

fn known_kind(descriptor: &EntityDescriptor, field: &str) -> DocumentStoreResult<FieldKind> {
    descriptor
        .kind_of(field)
        .ok_or_else(|| {
            DocumentStoreError::UnknownField(field.to_string(), descriptor.collection().to_string())
        })
}

/// Rewrites an expression tree into wire names and wire values.
struct PredicateEncoder<'a> {
    descriptor: &'a EntityDescriptor,
}

impl QueryVisitor for PredicateEncoder<'_> {
    type Output = Expr;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(Expr::And(
            exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        ))
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(Expr::Or(
            exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        ))
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(self.visit_expr(expr)?.not())
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        known_kind(self.descriptor, field)?;

        Ok(Expr::Exists(self.descriptor.wire_name(field).to_string(), should_exist))
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let kind = known_kind(self.descriptor, field)?;
        let encoded = match (op, value) {
            (FieldOp::AnyOf | FieldOp::NoneOf, Bson::Array(values)) => Bson::Array(
                values
                    .iter()
                    .map(|value| kind.encode(field, value.clone()))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => kind.encode(field, value.clone())?,
        };

        Ok(Expr::field(self.descriptor.wire_name(field).to_string(), *op, encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::ID_FIELD,
        query::{Predicate, SortDirection},
    };
    use bson::{DateTime, Uuid, doc};

    fn accounts() -> EntityDescriptor {
        EntityDescriptor::builder("accounts")
            .primary_key("id", FieldKind::Id, true)
            .field("nickname", FieldKind::String)
            .field("email", FieldKind::String)
            .timestamps()
            .build()
            .unwrap()
    }

    #[test]
    fn translate_encodes_each_value_under_its_wire_name() {
        let id = Uuid::new();
        let filter = translate(
            &accounts(),
            &FieldValues::new()
                .with("id", id.to_string())
                .with("updated_at", "2020-01-02T03:04:05.678Z")
                .with("nickname", "test"),
        )
        .unwrap();

        assert_eq!(
            filter.document(),
            &doc! {
                ID_FIELD: id,
                "updated_at": DateTime::from_millis(1_577_934_245_678),
                "nickname": "test",
            }
        );
    }

    #[test]
    fn translate_rejects_undeclared_fields() {
        let err = translate(&accounts(), &FieldValues::new().with("password", "x")).unwrap_err();

        assert!(matches!(err, DocumentStoreError::UnknownField(field, collection)
            if field == "password" && collection == "accounts"));
    }

    #[test]
    fn filter_lowers_to_an_equality_conjunction() {
        let filter = Filter::from_document(doc! { "a": 1, "b": "two" });

        assert_eq!(
            filter.to_expr(),
            Predicate::and([Predicate::eq("a", 1), Predicate::eq("b", "two")])
        );
    }

    #[test]
    fn key_filter_requires_a_primary_key() {
        let events = EntityDescriptor::builder("events")
            .field("payload", FieldKind::Any)
            .build()
            .unwrap();

        assert!(matches!(
            key_filter(&events, Bson::Int32(1)),
            Err(DocumentStoreError::Precondition(_))
        ));
    }

    #[test]
    fn translate_query_encodes_nested_expressions_and_sort() {
        let id = Uuid::new();
        let query = Query::builder()
            .filter(
                Predicate::any_of("id", [id.to_string()])
                    .and(Predicate::gt("inserted_at", "2020-01-01T00:00:00Z").not()),
            )
            .sort("id", SortDirection::Asc)
            .limit(5)
            .build();

        let translated = translate_query(&accounts(), query).unwrap();

        assert_eq!(
            translated.filter,
            Some(Expr::And(vec![
                Expr::field(ID_FIELD.to_string(), FieldOp::AnyOf, Bson::Array(vec![Bson::from(id)])),
                Expr::field(
                    "inserted_at".to_string(),
                    FieldOp::Gt,
                    Bson::DateTime(DateTime::from_millis(1_577_836_800_000)),
                )
                .not(),
            ]))
        );
        assert_eq!(translated.sort.map(|sort| sort.field), Some(ID_FIELD.to_string()));
        assert_eq!(translated.limit, Some(5));
    }

    #[test]
    fn translate_query_rejects_unknown_sort_fields() {
        let query = Query::builder()
            .sort("rank", SortDirection::Desc)
            .build();

        assert!(matches!(
            translate_query(&accounts(), query),
            Err(DocumentStoreError::UnknownField(field, _)) if field == "rank"
        ));
    }
}

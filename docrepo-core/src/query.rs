//! Query expressions over entity fields.
//!
//! Queries are written against entity field names and value-form values; the repository runs
//! them through [`crate::filter::translate_query`] so every value is encoded exactly the way it
//! was written, and drivers only ever see wire names and wire values.
//!
//! # Building Queries
//!
//! ```ignore
//! use docrepo::query::{Predicate, Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Predicate::eq("nickname", "test").and(Predicate::gt("updated_at", cutoff)))
//!     .sort("inserted_at", SortDirection::Desc)
//!     .limit(10)
//!     .build();
//! ```
//!
//! # Predicates
//!
//! [`Predicate`] collects the constructors for expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Existence: `exists`, `not_exists`
//! - Membership: `any_of`, `none_of`
//! - Logical: `and`, `or`
//!
//! Expressions chain with [`Expr::and`], [`Expr::or`] and [`Expr::not`].

use bson::Bson;

use crate::error::DocumentStoreError;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (earliest, smallest or alphabetically first value first).
    Asc,
    /// Descending order (latest, largest or alphabetically last value first).
    Desc,
}

/// Sort specification for query results.
///
/// Names the entity field to sort by and the direction. Documents with equal (or missing)
/// values keep the driver's natural order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to.
    Eq,
    /// Not equal to. A document without the field matches.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// The field equals one of the values in an array.
    AnyOf,
    /// The field equals none of the values in an array. A document without the field matches.
    NoneOf,
}

/// A filter expression for querying entities.
///
/// Expressions combine with the logical variants (`And`, `Or`, `Not`) into arbitrarily nested
/// predicates. Values are in value form until the repository encodes them.
///
/// # Example
///
/// ```ignore
/// use docrepo::query::{Expr, Predicate};
///
/// let adults_named_test = Predicate::and(vec![
///     Predicate::eq("nickname", "test"),
///     Predicate::gte("age", 18),
/// ]);
///
/// let not_deleted = Predicate::exists("deleted_at").not();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of the expressions. An empty list matches everything.
    And(Vec<Expr>),
    /// Logical OR of the expressions. An empty list matches nothing.
    Or(Vec<Expr>),
    /// Logical NOT of an expression.
    Not(Box<Expr>),
    /// The field is present (`true`) or absent (`false`).
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The entity field to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, `other` is appended to it instead of nesting.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, `other` is appended to it instead of nesting.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// A filter together with sort, offset and limit.
///
/// Offset and limit are applied after filtering and sorting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filter expression; `None` matches every entity.
    pub filter: Option<Expr>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Number of matching results to skip.
    pub offset: Option<usize>,
    /// Result ordering; `None` leaves it to the driver.
    pub sort: Option<Sort>,
}

impl Query {
    /// Creates a query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new [`QueryBuilder`].
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Constructors for filter expressions.
///
/// Every constructor takes an entity field name and a value in the form the entity itself
/// serializes to (a UUID string or binary for keys, an RFC 3339 string or native datetime for
/// timestamps).
pub struct Predicate;

impl Predicate {
    /// Matches entities whose field equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches entities whose field does not equal `value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches entities whose field is greater than `value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches entities whose field is greater than or equal to `value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches entities whose field is less than `value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches entities whose field is less than or equal to `value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches entities whose field equals any of `values`.
    pub fn any_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::AnyOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches entities whose field equals none of `values`.
    pub fn none_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::NoneOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches entities whose stored document has the field.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches entities whose stored document lacks the field.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Matches entities satisfying every expression.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Matches entities satisfying at least one expression.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

/// Fluent builder for [`Query`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a builder for a query matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter expression, replacing any previous one.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Sets the maximum number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of matching results to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Sets the field and direction to sort by.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort { field: field.into(), direction });
        self
    }

    /// Returns the finished query.
    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks an [`Expr`] tree.
///
/// Implemented by the predicate encoder, which rewrites field names and values into wire
/// form, and by each driver, which turns the encoded tree into something it can execute.
/// Implementors provide one method per node kind; [`QueryVisitor::visit_expr`] dispatches.
pub trait QueryVisitor {
    /// The result of visiting an expression.
    type Output;
    /// The error a visit can fail with.
    type Error: Into<DocumentStoreError>;

    /// Visits a conjunction.
    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;

    /// Visits a disjunction.
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;

    /// Visits a negation.
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;

    /// Visits an existence check.
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;

    /// Visits a field comparison.
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    /// Dispatches `expr` to the method for its node kind.
    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

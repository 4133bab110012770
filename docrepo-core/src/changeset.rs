//! Sparse mutation requests over an entity instance.
//!
//! A [`Changeset`] pairs a base instance with the fields the caller explicitly wants to change.
//! A field counts as changed when its name is present in the change map, whatever its value,
//! so an explicit `updated_at` equal to the current one still takes precedence over
//! autogeneration.

use bson::{Bson, Document};

use crate::entity::Entity;

/// A base entity plus the explicitly changed fields.
///
/// # Example
///
/// ```ignore
/// let changeset = Changeset::new(account)
///     .change("nickname", "renamed")
///     .change("updated_at", five_years_ago);
/// ```
#[derive(Debug, Clone)]
pub struct Changeset<E: Entity> {
    base: E,
    changes: Document,
}

impl<E: Entity> Changeset<E> {
    /// Creates a changeset with no changes.
    pub fn new(base: E) -> Self {
        Self { base, changes: Document::new() }
    }

    /// Adds or replaces a change, returning the changeset.
    pub fn change(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.put(field, value);
        self
    }

    /// Adds or replaces a change in place.
    pub fn put(&mut self, field: impl Into<String>, value: impl Into<Bson>) {
        self.changes.insert(field.into(), value.into());
    }

    /// Returns `true` if the field was explicitly changed.
    pub fn is_changed(&self, field: &str) -> bool {
        self.changes.contains_key(field)
    }

    /// Returns the base instance the changes apply to.
    pub fn base(&self) -> &E {
        &self.base
    }

    /// Returns the explicit changes, keyed by entity field name, in the order they were made.
    pub fn changes(&self) -> &Document {
        &self.changes
    }

    /// Splits the changeset into its base instance and explicit changes.
    pub fn into_parts(self) -> (E, Document) {
        (self.base, self.changes)
    }
}

impl<E: Entity> From<E> for Changeset<E> {
    fn from(base: E) -> Self {
        Changeset::new(base)
    }
}

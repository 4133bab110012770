//! Autogeneration of system-managed fields.
//!
//! The [`Autogenerator`] applies the lifecycle rules for primary keys and timestamps to a
//! value-form record before it is encoded:
//!
//! 1. On insert, a missing primary key is generated when the descriptor asks for it. A key the
//!    caller supplied is never replaced.
//! 2. On insert, both timestamp fields are set to the current instant unless the changeset
//!    explicitly changes them. Each field is decided independently.
//! 3. On update, the update timestamp is refreshed unless explicitly changed. The insertion
//!    timestamp is never touched.
//! 4. Entities without timestamps get no timestamp fields at all.
//!
//! The current instant is read once per operation, so a plain insert stores identical
//! insertion and update timestamps.

use bson::{Bson, DateTime, Document, Uuid};
use std::fmt::Debug;

use crate::{codec::FieldKind, descriptor::EntityDescriptor, entity::is_blank};

/// Source of the current instant.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant at the store's millisecond precision.
    fn now(&self) -> DateTime;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime {
        DateTime::now()
    }
}

/// Applies autogeneration rules for one entity type at one instant.
#[derive(Debug)]
pub struct Autogenerator<'a> {
    descriptor: &'a EntityDescriptor,
    now: DateTime,
}

impl<'a> Autogenerator<'a> {
    /// Creates an autogenerator for `descriptor`'s entity type.
    ///
    /// `now` is the single instant every timestamp written by this autogenerator receives.
    pub fn new(descriptor: &'a EntityDescriptor, now: DateTime) -> Self {
        Self { descriptor, now }
    }

    /// Completes a full value-form record for insertion.
    ///
    /// # Arguments
    ///
    /// * `record` - The base instance merged with the explicit changes
    /// * `explicit` - The explicit changes, used only to decide precedence
    pub fn on_insert(&self, record: &mut Document, explicit: &Document) {
        if let Some(pk) = self.descriptor.primary_key() {
            let missing = record
                .get(&pk.name)
                .is_none_or(is_blank);

            if pk.autogenerate && missing {
                let key = generate_key(pk.kind);
                tracing::trace!(
                    collection = self.descriptor.collection(),
                    field = pk.name.as_str(),
                    "generated primary key"
                );
                record.insert(pk.name.clone(), key);
            }
        }

        if let Some(ts) = self.descriptor.timestamps() {
            for field in [&ts.inserted_at, &ts.updated_at] {
                if !explicit.contains_key(field) {
                    record.insert(field.clone(), Bson::DateTime(self.now));
                }
            }
        }
    }

    /// Completes a sparse change set for an update.
    ///
    /// Drops any change to the insertion timestamp and sets the update timestamp unless the
    /// caller changed it explicitly. Does nothing for entities without timestamps.
    pub fn on_update(&self, changes: &mut Document) {
        if let Some(ts) = self.descriptor.timestamps() {
            changes.remove(&ts.inserted_at);

            if !changes.contains_key(&ts.updated_at) {
                changes.insert(ts.updated_at.clone(), Bson::DateTime(self.now));
            }
        }
    }
}

/// A fresh random UUID, as a string for string keys and as a UUID binary otherwise.
fn generate_key(kind: FieldKind) -> Bson {
    match kind {
        FieldKind::String => Bson::String(Uuid::new().to_string()),
        _ => Bson::from(Uuid::new()),
    }
}

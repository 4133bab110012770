//! Static per-entity metadata and the registry that resolves it.
//!
//! An [`EntityDescriptor`] captures everything the mapping layer needs to know about an entity
//! type: the collection it lives in, its primary key and autogeneration policy, its ordered
//! fields and their kinds, and whether it carries an autogenerated timestamp pair.
//!
//! Descriptors are declared through [`DescriptorBuilder`] from [`Entity::schema`] and
//! validated once, when the [`DescriptorRegistry`] first resolves the type.
//!
//! # Example
//!
//! ```ignore
//! let descriptor = EntityDescriptor::builder("accounts")
//!     .primary_key("id", FieldKind::Id, true)
//!     .field("nickname", FieldKind::String)
//!     .field("email", FieldKind::String)
//!     .timestamps()
//!     .build()?;
//! ```

use mea::rwlock::RwLock;
use std::{
    any::TypeId,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    codec::{FieldKind, ID_FIELD},
    entity::Entity,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Conventional name of the insertion timestamp field.
pub const INSERTED_AT: &str = "inserted_at";
/// Conventional name of the update timestamp field.
pub const UPDATED_AT: &str = "updated_at";

/// A declared field and its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// The primary-key declaration of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub name: String,
    pub kind: FieldKind,
    /// Whether a fresh key is generated on insert when none is supplied.
    pub autogenerate: bool,
}

/// The autogenerated timestamp pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamps {
    pub inserted_at: String,
    pub updated_at: String,
}

/// Immutable metadata describing how an entity type maps onto a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    collection: String,
    primary_key: Option<PrimaryKey>,
    fields: Vec<FieldSpec>,
    timestamps: Option<Timestamps>,
}

impl EntityDescriptor {
    /// Starts a declaration for the given collection.
    pub fn builder(collection: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(collection)
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the primary-key declaration, if the entity has one.
    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        self.primary_key.as_ref()
    }

    /// Returns all fields in declaration order, primary key first.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Returns the timestamp pair, if timestamps are enabled.
    pub fn timestamps(&self) -> Option<&Timestamps> {
        self.timestamps.as_ref()
    }

    /// Returns `true` if the entity carries `inserted_at`/`updated_at` fields.
    pub fn timestamps_enabled(&self) -> bool {
        self.timestamps.is_some()
    }

    /// Looks up a field declaration by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|field| field.name == name)
    }

    /// Returns the kind of a declared field.
    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.field(name).map(|field| field.kind)
    }

    /// Returns `true` if `name` is the primary-key field.
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key
            .as_ref()
            .is_some_and(|pk| pk.name == name)
    }

    /// Returns the name a field is stored under in wire documents.
    pub fn wire_name<'a>(&self, name: &'a str) -> &'a str {
        if self.is_primary_key(name) {
            ID_FIELD
        } else {
            name
        }
    }
}

/// Fluent declaration of an [`EntityDescriptor`].
///
/// Nothing is validated until [`DescriptorBuilder::build`], so declarations read top to bottom
/// and all problems are reported together at resolution time.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    collection: String,
    primary_keys: Vec<PrimaryKey>,
    fields: Vec<FieldSpec>,
    inserted_at: Option<String>,
    updated_at: Option<String>,
}

impl DescriptorBuilder {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            primary_keys: Vec::new(),
            fields: Vec::new(),
            inserted_at: None,
            updated_at: None,
        }
    }

    /// Declares the primary key.
    ///
    /// # Arguments
    ///
    /// * `name` - The field name on the entity
    /// * `kind` - The field kind; only `Id` and `String` keys can be autogenerated
    /// * `autogenerate` - Whether to generate a key on insert when none is supplied
    pub fn primary_key(mut self, name: impl Into<String>, kind: FieldKind, autogenerate: bool) -> Self {
        self.primary_keys.push(PrimaryKey { name: name.into(), kind, autogenerate });
        self
    }

    /// Declares a regular field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec { name: name.into(), kind });
        self
    }

    /// Declares the insertion timestamp field.
    pub fn inserted_at(mut self, name: impl Into<String>) -> Self {
        self.inserted_at = Some(name.into());
        self
    }

    /// Declares the update timestamp field.
    pub fn updated_at(mut self, name: impl Into<String>) -> Self {
        self.updated_at = Some(name.into());
        self
    }

    /// Declares the conventional `inserted_at`/`updated_at` timestamp pair.
    pub fn timestamps(self) -> Self {
        self.inserted_at(INSERTED_AT)
            .updated_at(UPDATED_AT)
    }

    /// Validates the declaration and produces the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] when the collection name is empty, more
    /// than one primary key is declared, a field name repeats, only half of the timestamp
    /// pair is declared, a timestamp field is not a datetime, or autogeneration is requested
    /// for a key kind that cannot be generated.
    pub fn build(self) -> DocumentStoreResult<EntityDescriptor> {
        let invalid = |reason: String| DocumentStoreError::Configuration(self.collection.clone(), reason);

        if self.collection.trim().is_empty() {
            return Err(invalid("collection name is empty".to_string()));
        }

        if self.primary_keys.len() > 1 {
            return Err(invalid(format!(
                "{} primary keys declared, at most one is allowed",
                self.primary_keys.len()
            )));
        }

        let primary_key = self.primary_keys.first().cloned();

        if let Some(pk) = &primary_key {
            if pk.autogenerate && !matches!(pk.kind, FieldKind::Id | FieldKind::String) {
                return Err(invalid(format!(
                    "primary key {} of kind {} cannot be autogenerated",
                    pk.name, pk.kind
                )));
            }
        }

        let timestamps = match (&self.inserted_at, &self.updated_at) {
            (Some(inserted_at), Some(updated_at)) if inserted_at == updated_at => {
                return Err(invalid(format!(
                    "timestamp fields must be distinct, both are named {inserted_at}"
                )));
            }
            (Some(inserted_at), Some(updated_at)) => Some(Timestamps {
                inserted_at: inserted_at.clone(),
                updated_at: updated_at.clone(),
            }),
            (None, None) => None,
            (Some(name), None) | (None, Some(name)) => {
                return Err(invalid(format!(
                    "timestamp field {name} is declared without its pair"
                )));
            }
        };

        let mut fields = Vec::with_capacity(self.fields.len() + 3);

        if let Some(pk) = &primary_key {
            fields.push(FieldSpec { name: pk.name.clone(), kind: pk.kind });
        }
        fields.extend(self.fields.iter().cloned());

        if let Some(ts) = &timestamps {
            for name in [&ts.inserted_at, &ts.updated_at] {
                match fields.iter().find(|field| &field.name == name) {
                    Some(field) if field.kind != FieldKind::DateTime => {
                        return Err(invalid(format!(
                            "timestamp field {name} is declared as {} instead of datetime",
                            field.kind
                        )));
                    }
                    Some(_) => {}
                    None => fields.push(FieldSpec { name: name.clone(), kind: FieldKind::DateTime }),
                }
            }
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.name.is_empty() || field.name == ID_FIELD {
                return Err(invalid(format!("field name {:?} is reserved", field.name)));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("field {} is declared more than once", field.name)));
            }
        }

        Ok(EntityDescriptor {
            collection: self.collection,
            primary_key,
            fields,
            timestamps,
        })
    }
}

/// Process-lifetime cache of resolved descriptors, keyed by entity type.
///
/// Entries are populated on first use (or eagerly through the repository builder) and never
/// evicted. Declarations that fail validation are not cached.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    descriptors: RwLock<HashMap<TypeId, Arc<EntityDescriptor>>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with descriptors resolved ahead of time.
    pub fn preloaded(descriptors: HashMap<TypeId, Arc<EntityDescriptor>>) -> Self {
        Self { descriptors: RwLock::new(descriptors) }
    }

    /// Resolves the descriptor for `E`, building and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if the entity's declaration is malformed.
    pub async fn describe<E: Entity>(&self) -> DocumentStoreResult<Arc<EntityDescriptor>> {
        let type_id = TypeId::of::<E>();

        if let Some(descriptor) = self.descriptors.read().await.get(&type_id) {
            return Ok(descriptor.clone());
        }

        let mut descriptors = self.descriptors.write().await;

        // Another task may have resolved it while we waited for the write lock.
        if let Some(descriptor) = descriptors.get(&type_id) {
            return Ok(descriptor.clone());
        }

        let descriptor = Arc::new(E::schema().build()?);
        tracing::debug!(
            collection = descriptor.collection(),
            fields = descriptor.fields().len(),
            timestamps = descriptor.timestamps_enabled(),
            "resolved entity descriptor"
        );
        descriptors.insert(type_id, descriptor.clone());

        Ok(descriptor)
    }

    /// Returns the number of resolved entity types.
    pub async fn len(&self) -> usize {
        self.descriptors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_reason(result: DocumentStoreResult<EntityDescriptor>) -> String {
        match result {
            Err(DocumentStoreError::Configuration(_, reason)) => reason,
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn timestamps_are_appended_as_datetime_fields() {
        let descriptor = EntityDescriptor::builder("accounts")
            .primary_key("id", FieldKind::Id, true)
            .field("nickname", FieldKind::String)
            .timestamps()
            .build()
            .unwrap();

        let names = descriptor
            .fields()
            .iter()
            .map(|field| field.name.as_str())
            .collect::<Vec<_>>();

        assert_eq!(names, ["id", "nickname", "inserted_at", "updated_at"]);
        assert_eq!(descriptor.kind_of("updated_at"), Some(FieldKind::DateTime));
        assert_eq!(descriptor.wire_name("id"), ID_FIELD);
        assert_eq!(descriptor.wire_name("nickname"), "nickname");
    }

    #[test]
    fn half_a_timestamp_pair_is_rejected() {
        let reason = config_reason(
            EntityDescriptor::builder("posts")
                .updated_at("touched_at")
                .build(),
        );

        assert!(reason.contains("touched_at"));
    }

    #[test]
    fn second_primary_key_is_rejected() {
        let result = EntityDescriptor::builder("posts")
            .primary_key("id", FieldKind::Id, true)
            .primary_key("slug", FieldKind::String, false)
            .build();

        assert!(config_reason(result).contains("primary keys"));
    }

    #[test]
    fn timestamp_declared_with_wrong_kind_is_rejected() {
        let result = EntityDescriptor::builder("posts")
            .field("inserted_at", FieldKind::String)
            .timestamps()
            .build();

        assert!(config_reason(result).contains("instead of datetime"));
    }

    #[test]
    fn integer_keys_cannot_be_autogenerated() {
        let result = EntityDescriptor::builder("counters")
            .primary_key("id", FieldKind::Integer, true)
            .build();

        assert!(config_reason(result).contains("cannot be autogenerated"));
    }

    #[test]
    fn duplicate_and_reserved_names_are_rejected() {
        let duplicate = EntityDescriptor::builder("posts")
            .field("title", FieldKind::String)
            .field("title", FieldKind::String)
            .build();
        let reserved = EntityDescriptor::builder("posts")
            .field("_id", FieldKind::Any)
            .build();

        assert!(config_reason(duplicate).contains("more than once"));
        assert!(config_reason(reserved).contains("reserved"));
    }

    #[test]
    fn entities_without_keys_or_timestamps_are_valid() {
        let descriptor = EntityDescriptor::builder("events")
            .field("payload", FieldKind::Any)
            .build()
            .unwrap();

        assert!(descriptor.primary_key().is_none());
        assert!(!descriptor.timestamps_enabled());
        assert_eq!(descriptor.fields().len(), 1);
    }
}

//! The entity trait and serialization helpers.
//!
//! Entities are ordinary serde structs. Implementing [`Entity`] registers the type's shape
//! with the mapping layer through [`Entity::schema`].

use bson::{
    Bson, Document,
    de::deserialize_from_document,
    ser::serialize_to_document,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    descriptor::{DescriptorBuilder, EntityDescriptor},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Core trait implemented by every type stored through a repository.
///
/// The primary key and timestamp fields are usually `Option`s so that a new instance can be
/// built without them and the repository can fill them in on insert.
///
/// # Example
///
/// ```ignore
/// use docrepo::prelude::*;
/// use bson::Uuid;
/// use chrono::{DateTime, Utc};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// pub struct Account {
///     pub id: Option<Uuid>,
///     pub nickname: String,
///     pub email: String,
///     pub inserted_at: Option<DateTime<Utc>>,
///     pub updated_at: Option<DateTime<Utc>>,
/// }
///
/// impl Entity for Account {
///     fn schema() -> DescriptorBuilder {
///         EntityDescriptor::builder("accounts")
///             .primary_key("id", FieldKind::Id, true)
///             .field("nickname", FieldKind::String)
///             .field("email", FieldKind::String)
///             .timestamps()
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Declares the collection, primary key, fields and timestamps of this entity type.
    ///
    /// Called once per repository; the result is validated and cached.
    fn schema() -> DescriptorBuilder;
}

/// Extension trait converting entities to and from their value-form documents.
pub trait EntityExt: Entity {
    /// Serializes this entity into its value form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_values(&self) -> DocumentStoreResult<Document>;

    /// Builds an entity from a value-form document.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or has the wrong shape.
    fn from_values(values: Document) -> DocumentStoreResult<Self>;

    /// Returns the value of the primary key, or `None` when the entity has no key yet.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Precondition`] if the entity type declares no primary key.
    fn key(&self, descriptor: &EntityDescriptor) -> DocumentStoreResult<Option<Bson>>;
}

impl<E: Entity> EntityExt for E {
    fn to_values(&self) -> DocumentStoreResult<Document> {
        Ok(serialize_to_document(self)?)
    }

    fn from_values(values: Document) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_document(values)?)
    }

    fn key(&self, descriptor: &EntityDescriptor) -> DocumentStoreResult<Option<Bson>> {
        let pk = descriptor
            .primary_key()
            .ok_or_else(|| {
                DocumentStoreError::Precondition(format!(
                    "entities in {} have no primary key",
                    descriptor.collection()
                ))
            })?;

        Ok(self
            .to_values()?
            .remove(&pk.name)
            .filter(|value| !is_blank(value)))
    }
}

/// Returns `true` for values that count as an absent key: null, empty strings and empty
/// binaries.
pub fn is_blank(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => true,
        Bson::String(value) => value.is_empty(),
        Bson::Binary(binary) => binary.bytes.is_empty(),
        _ => false,
    }
}

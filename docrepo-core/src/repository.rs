//! The repository façade.
//!
//! A [`Repository`] is the single entry point applications use. It resolves each entity
//! type's descriptor, applies autogeneration, encodes values for the wire, delegates to the
//! driver and decodes the results back into entities.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//!
//! let repo = Repository::new(InMemoryStore::new());
//!
//! let account = repo
//!     .insert(Account { id: None, nickname: "test".into(), email: "a@b.c".into(), ..Default::default() })
//!     .await?;
//!
//! let renamed = repo
//!     .update(Changeset::new(account).change("nickname", "renamed"))
//!     .await?;
//! ```

use bson::{Bson, Document};
use std::{any::TypeId, collections::HashMap, sync::Arc};
use tracing::debug;

use crate::{
    autogen::{Autogenerator, Clock, SystemClock},
    backend::StoreBackend,
    changeset::Changeset,
    codec::{ID_FIELD, datetimes_as_rfc3339, decode_document, encode_document},
    descriptor::{DescriptorRegistry, EntityDescriptor},
    entity::{Entity, EntityExt, is_blank},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{FieldValues, key_filter, translate, translate_query},
    query::Query,
};

/// A typed entity repository bound to a specific driver.
///
/// # Type Parameters
///
/// * `B` - The driver implementation type
#[derive(Debug)]
pub struct Repository<B: StoreBackend> {
    backend: B,
    registry: DescriptorRegistry,
    clock: Arc<dyn Clock>,
}

impl<B: StoreBackend> Repository<B> {
    /// Creates a repository using the system clock and lazily resolved descriptors.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: DescriptorRegistry::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Creates a [`RepositoryBuilder`] for configuring the clock and registering entities.
    pub fn builder(backend: B) -> RepositoryBuilder<B> {
        RepositoryBuilder::new(backend)
    }

    /// Returns the underlying driver.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Resolves the descriptor of `E`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if the entity's declaration is malformed.
    pub async fn descriptor<E: Entity>(&self) -> DocumentStoreResult<Arc<EntityDescriptor>> {
        self.registry.describe::<E>().await
    }

    /// Inserts a new entity and returns it as stored, autogenerated fields included.
    ///
    /// Accepts either a bare entity or a [`Changeset`]; explicit changes take precedence over
    /// both the base instance and timestamp autogeneration.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownField`] or [`DocumentStoreError::TypeMismatch`] if
    /// the record cannot be encoded, or any error reported by the driver.
    pub async fn insert<E: Entity>(&self, entity: impl Into<Changeset<E>>) -> DocumentStoreResult<E> {
        let descriptor = self.registry.describe::<E>().await?;
        let (base, changes) = entity.into().into_parts();

        let mut record = base.to_values()?;
        for (field, value) in changes.iter() {
            record.insert(field.clone(), value.clone());
        }

        Autogenerator::new(&descriptor, self.clock.now()).on_insert(&mut record, &changes);

        let mut document = encode_document(&descriptor, record)?;
        if document.get(ID_FIELD).is_some_and(is_blank) {
            // Let the driver assign its own key.
            document.remove(ID_FIELD);
        }

        debug!(collection = descriptor.collection(), "inserting entity");

        let stored = self
            .backend
            .create_document(descriptor.collection(), document)
            .await?;

        decode_entity(&descriptor, stored)
    }

    /// Applies a changeset to a stored entity and returns the refreshed entity.
    ///
    /// Only the changed fields (plus a refreshed update timestamp) are written; other stored
    /// fields are left as they are. A changeset with nothing to write re-reads the stored
    /// entity instead.
    ///
    /// Setting the primary key to the value it already has is allowed and writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Precondition`] if the base instance has no key or the
    /// changeset tries to change it, [`DocumentStoreError::NotFound`] if no stored entity has
    /// that key, or an encoding error for unknown fields and mismatched values.
    pub async fn update<E: Entity>(&self, changeset: Changeset<E>) -> DocumentStoreResult<E> {
        let descriptor = self.registry.describe::<E>().await?;
        let (base, mut changes) = changeset.into_parts();
        let key = require_key(&descriptor, &base, "update")?;

        if let Some(pk) = descriptor.primary_key() {
            if let Some(requested) = changes.remove(&pk.name) {
                let current = pk.kind.encode(&pk.name, key.clone())?;

                if pk.kind.encode(&pk.name, requested)? != current {
                    return Err(DocumentStoreError::Precondition(format!(
                        "the primary key {} of {} cannot be changed",
                        pk.name,
                        descriptor.collection()
                    )));
                }
            }
        }

        Autogenerator::new(&descriptor, self.clock.now()).on_update(&mut changes);

        let filter = key_filter(&descriptor, key.clone())?;

        if changes.is_empty() {
            debug!(collection = descriptor.collection(), "nothing to update, re-reading entity");

            return match self
                .backend
                .read_one_document(descriptor.collection(), &filter)
                .await?
            {
                Some(document) => decode_entity(&descriptor, document),
                None => Err(DocumentStoreError::NotFound(
                    key.to_string(),
                    descriptor.collection().to_string(),
                )),
            };
        }

        let changes = encode_document(&descriptor, changes)?;

        debug!(
            collection = descriptor.collection(),
            fields = changes.len(),
            "updating entity"
        );

        let stored = self
            .backend
            .update_one_document(descriptor.collection(), &filter, changes)
            .await?;

        decode_entity(&descriptor, stored)
    }

    /// Fetches an entity by primary key.
    ///
    /// The key may be given in value form (a UUID string for `Id` keys) or wire form.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] if no entity has that key.
    pub async fn get<E: Entity>(&self, key: impl Into<Bson>) -> DocumentStoreResult<E> {
        let descriptor = self.registry.describe::<E>().await?;
        let key = key.into();
        let filter = key_filter(&descriptor, key.clone())?;

        match self
            .backend
            .read_one_document(descriptor.collection(), &filter)
            .await?
        {
            Some(document) => decode_entity(&descriptor, document),
            None => Err(DocumentStoreError::NotFound(
                key.to_string(),
                descriptor.collection().to_string(),
            )),
        }
    }

    /// Fetches the first entity whose fields equal all of `values`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownField`] for undeclared fields.
    pub async fn get_by<E: Entity>(&self, values: FieldValues) -> DocumentStoreResult<Option<E>> {
        let descriptor = self.registry.describe::<E>().await?;
        let filter = translate(&descriptor, &values)?;

        self.backend
            .read_one_document(descriptor.collection(), &filter)
            .await?
            .map(|document| decode_entity(&descriptor, document))
            .transpose()
    }

    /// Deletes a stored entity and returns it as it was stored.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Precondition`] if the entity has no key, or
    /// [`DocumentStoreError::NotFound`] if it is not stored.
    pub async fn delete<E: Entity>(&self, entity: &E) -> DocumentStoreResult<E> {
        let descriptor = self.registry.describe::<E>().await?;
        let key = require_key(&descriptor, entity, "delete")?;
        let filter = key_filter(&descriptor, key)?;

        debug!(collection = descriptor.collection(), "deleting entity");

        let removed = self
            .backend
            .delete_one_document(descriptor.collection(), &filter)
            .await?;

        decode_entity(&descriptor, removed)
    }

    /// Returns every entity matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownField`] for undeclared filter or sort fields.
    pub async fn all<E: Entity>(&self, query: Query) -> DocumentStoreResult<Vec<E>> {
        let descriptor = self.registry.describe::<E>().await?;
        let query = translate_query(&descriptor, query)?;

        self.backend
            .query_documents(descriptor.collection(), query)
            .await?
            .into_iter()
            .map(|document| decode_entity(&descriptor, document))
            .collect()
    }

    /// Creates the collection backing `E`.
    pub async fn create_collection<E: Entity>(&self) -> DocumentStoreResult<()> {
        let descriptor = self.registry.describe::<E>().await?;

        self.backend
            .create_collection(descriptor.collection())
            .await
    }

    /// Drops the collection backing `E` with all its entities.
    pub async fn drop_collection<E: Entity>(&self) -> DocumentStoreResult<()> {
        let descriptor = self.registry.describe::<E>().await?;

        self.backend
            .drop_collection(descriptor.collection())
            .await
    }

    /// Lists all collections in the store.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the repository and releases driver resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to shut down cleanly.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

impl<B: StoreBackend + 'static> Repository<B> {
    /// Erases the driver type, for selecting a driver at runtime.
    pub fn into_dyn(self) -> Repository<Box<dyn crate::backend::DynStoreBackend>> {
        Repository {
            backend: Box::new(self.backend),
            registry: self.registry,
            clock: self.clock,
        }
    }
}

fn require_key<E: Entity>(descriptor: &EntityDescriptor, entity: &E, action: &str) -> DocumentStoreResult<Bson> {
    entity.key(descriptor)?.ok_or_else(|| {
        DocumentStoreError::Precondition(format!(
            "cannot {action} an entity of {} without a primary key value",
            descriptor.collection()
        ))
    })
}

/// Decodes a stored document into `E`.
///
/// Datetimes decode to the native type first; entities that hold them as `chrono` values are
/// read back from the RFC 3339 rendering instead.
fn decode_entity<E: Entity>(descriptor: &EntityDescriptor, document: Document) -> DocumentStoreResult<E> {
    let values = decode_document(descriptor, document)?;

    match datetimes_as_rfc3339(descriptor, &values) {
        None => E::from_values(values),
        Some(rendered) => E::from_values(values).or_else(|native| {
            E::from_values(rendered).map_err(|_| native)
        }),
    }
}

/// Configures a [`Repository`] before use.
#[derive(Debug)]
pub struct RepositoryBuilder<B: StoreBackend> {
    backend: B,
    clock: Arc<dyn Clock>,
    descriptors: HashMap<TypeId, Arc<EntityDescriptor>>,
}

impl<B: StoreBackend> RepositoryBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            descriptors: HashMap::new(),
        }
    }

    /// Replaces the source of the current instant used for timestamps.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Resolves the descriptor of `E` now instead of on first use.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if the entity's declaration is malformed.
    pub fn register<E: Entity>(mut self) -> DocumentStoreResult<Self> {
        let descriptor = E::schema().build()?;
        debug!(collection = descriptor.collection(), "registered entity");
        self.descriptors
            .insert(TypeId::of::<E>(), Arc::new(descriptor));

        Ok(self)
    }

    /// Finishes configuration. Entities not registered are resolved on first use.
    pub fn build(self) -> Repository<B> {
        Repository {
            backend: self.backend,
            registry: DescriptorRegistry::preloaded(self.descriptors),
            clock: self.clock,
        }
    }
}

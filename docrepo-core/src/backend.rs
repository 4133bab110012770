//! Storage driver abstraction.
//!
//! The repository never talks to a database directly. It hands fully encoded documents and
//! filters to a [`StoreBackend`], which only has to provide single-document CRUD over a named
//! collection plus a few collection-level operations.
//!
//! # Traits
//!
//! - [`StoreBackend`]: the driver contract
//! - [`DynStoreBackend`]: an object-safe mirror for runtime driver selection
//! - [`StoreBackendBuilder`]: factory trait for creating drivers
//!
//! # Errors
//!
//! Drivers report their own failures as [`DocumentStoreError::Backend`]
//! (crate::error::DocumentStoreError::Backend); the repository passes them through without
//! interpretation. Drivers report a missing document for update and delete as
//! [`DocumentStoreError::NotFound`](crate::error::DocumentStoreError::NotFound).

use async_trait::async_trait;
use bson::Document;
use std::{any::Any, fmt::Debug};

use crate::{error::DocumentStoreResult, filter::Filter, query::Query};

/// Abstract interface for document storage drivers.
///
/// All documents and filters passed in are already in wire form: field names are storage
/// names (the primary key lives under `_id`) and values use the engine's native encodings.
/// A driver stores and matches them as given and never interprets entity semantics.
///
/// # Thread Safety
///
/// Implementations must be safe to share between tasks. Each call is independent; the
/// repository takes no locks around driver calls, so concurrent writes to the same document
/// resolve however the engine resolves them.
///
/// # Errors
///
/// Engine failures are reported as [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend).
/// Each method lists the other variants it may return.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Stores a new document and returns it as stored.
    ///
    /// If the document has no `_id`, the driver assigns one and includes it in the returned
    /// document. The collection is created on first use.
    ///
    /// # Arguments
    ///
    /// * `collection` - The collection to insert into
    /// * `document` - The encoded document
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// if a document with the same `_id` is already stored.
    async fn create_document(&self, collection: &str, document: Document) -> DocumentStoreResult<Document>;

    /// Returns the first document matching `filter`, or `None`.
    ///
    /// A missing collection holds no documents and yields `None`.
    async fn read_one_document(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Sets the fields of `changes` on the first document matching `filter` and returns the
    /// refreshed document.
    ///
    /// Fields absent from `changes` are left as they are. `changes` is never empty.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`](crate::error::DocumentStoreError::NotFound)
    /// if nothing matches.
    async fn update_one_document(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Document,
    ) -> DocumentStoreResult<Document>;

    /// Removes the first document matching `filter` and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`](crate::error::DocumentStoreError::NotFound)
    /// if nothing matches.
    async fn delete_one_document(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<Document>;

    /// Returns every document matching the query, honoring sort, offset and limit.
    ///
    /// The query's field names and values are already encoded. A missing collection yields
    /// an empty list.
    ///
    /// # Errors
    ///
    /// Drivers may return [`DocumentStoreError::InvalidDocument`](crate::error::DocumentStoreError::InvalidDocument)
    /// for an expression they cannot execute, such as a membership test without an array.
    async fn query_documents(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>>;

    /// Creates an empty collection. Creating an existing collection is not an error.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops a collection and all its documents.
    ///
    /// # Errors
    ///
    /// Drivers that track collections may return
    /// [`DocumentStoreError::CollectionNotFound`](crate::error::DocumentStoreError::CollectionNotFound)
    /// for a collection that does not exist.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections, in no particular order.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Releases driver resources such as connection pools.
    ///
    /// Consumes the driver. The default implementation does nothing.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn create_document(&self, collection: &str, document: Document) -> DocumentStoreResult<Document> {
        (*self)
            .create_document(collection, document)
            .await
    }

    async fn read_one_document(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> DocumentStoreResult<Option<Document>> {
        (*self)
            .read_one_document(collection, filter)
            .await
    }

    async fn update_one_document(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Document,
    ) -> DocumentStoreResult<Document> {
        (*self)
            .update_one_document(collection, filter, changes)
            .await
    }

    async fn delete_one_document(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<Document> {
        (*self)
            .delete_one_document(collection, filter)
            .await
    }

    async fn query_documents(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        (*self)
            .query_documents(collection, query)
            .await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (*self).create_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (*self).drop_collection(name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        (*self).list_collections().await
    }
}

/// Object-safe mirror of [`StoreBackend`], implemented for every driver.
///
/// [`StoreBackend::shutdown`] consumes `self` by value, which keeps it off trait objects.
/// This trait replaces it with [`DynStoreBackend::shutdown_boxed`] and is what
/// `Box<dyn DynStoreBackend>` implements [`StoreBackend`] through, so a repository can pick
/// its driver at runtime.
///
/// Every method behaves exactly like its [`StoreBackend`] counterpart.
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    /// See [`StoreBackend::create_document`].
    async fn create_document(&self, collection: &str, document: Document) -> DocumentStoreResult<Document>;

    /// See [`StoreBackend::read_one_document`].
    async fn read_one_document(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> DocumentStoreResult<Option<Document>>;

    /// See [`StoreBackend::update_one_document`].
    async fn update_one_document(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Document,
    ) -> DocumentStoreResult<Document>;

    /// See [`StoreBackend::delete_one_document`].
    async fn delete_one_document(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<Document>;

    /// See [`StoreBackend::query_documents`].
    async fn query_documents(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>>;

    /// See [`StoreBackend::create_collection`].
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// See [`StoreBackend::drop_collection`].
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// See [`StoreBackend::list_collections`].
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Shuts down a boxed driver. See [`StoreBackend::shutdown`].
    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()>;

    /// Returns the driver as [`Any`], for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + 'static> DynStoreBackend for B {
    async fn create_document(&self, collection: &str, document: Document) -> DocumentStoreResult<Document> {
        StoreBackend::create_document(self, collection, document).await
    }

    async fn read_one_document(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> DocumentStoreResult<Option<Document>> {
        StoreBackend::read_one_document(self, collection, filter).await
    }

    async fn update_one_document(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Document,
    ) -> DocumentStoreResult<Document> {
        StoreBackend::update_one_document(self, collection, filter, changes).await
    }

    async fn delete_one_document(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<Document> {
        StoreBackend::delete_one_document(self, collection, filter).await
    }

    async fn query_documents(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        StoreBackend::query_documents(self, collection, query).await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        StoreBackend::create_collection(self, name).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        StoreBackend::drop_collection(self, name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        StoreBackend::list_collections(self).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl StoreBackend for Box<dyn DynStoreBackend> {
    async fn create_document(&self, collection: &str, document: Document) -> DocumentStoreResult<Document> {
        DynStoreBackend::create_document(&**self, collection, document).await
    }

    async fn read_one_document(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> DocumentStoreResult<Option<Document>> {
        DynStoreBackend::read_one_document(&**self, collection, filter).await
    }

    async fn update_one_document(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Document,
    ) -> DocumentStoreResult<Document> {
        DynStoreBackend::update_one_document(&**self, collection, filter, changes).await
    }

    async fn delete_one_document(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<Document> {
        DynStoreBackend::delete_one_document(&**self, collection, filter).await
    }

    async fn query_documents(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        DynStoreBackend::query_documents(&**self, collection, query).await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        DynStoreBackend::create_collection(&**self, name).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        DynStoreBackend::drop_collection(&**self, name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        DynStoreBackend::list_collections(&**self).await
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown_boxed().await
    }
}

/// Factory for drivers that need asynchronous setup, such as opening a connection.
///
/// # Example
///
/// ```ignore
/// use docrepo::{backend::StoreBackendBuilder, memory::InMemoryStore, Repository};
///
/// let repo = Repository::new(InMemoryStore::builder().build().await?);
/// ```
#[async_trait]
pub trait StoreBackendBuilder {
    /// The driver this builder produces.
    type Backend: StoreBackend;

    /// Builds the driver.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`](crate::error::DocumentStoreError::Initialization)
    /// if the driver cannot be configured or connected.
    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}

//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory driver that keeps each collection as an ordered
//! list of BSON documents behind an async-safe read-write lock.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, oid::ObjectId};

use docrepo_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    codec::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    query::{Query, SortDirection},
};

use crate::evaluator::{DocumentEvaluator, compare_fields};

type CollectionMap = Vec<Document>;
type StoreMap = HashMap<String, CollectionMap>;


/// Thread-safe in-memory document storage driver.
///
/// Documents keep their insertion order, which is also the order unsorted queries return.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Every lookup scans the whole collection (no indexing). It is meant for tests and small
/// datasets.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let stored = store.create_document("users", doc! { "name": "Alice" }).await?;
/// assert!(stored.contains_key("_id"));
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn position(documents: &[Document], filter: &Filter) -> Option<usize> {
    documents
        .iter()
        .position(|document| DocumentEvaluator::matches_all(document, filter.document()))
}

fn not_found(filter: &Filter, collection: &str) -> DocumentStoreError {
    DocumentStoreError::NotFound(filter.document().to_string(), collection.to_string())
}


#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn create_document(&self, collection: &str, mut document: Document) -> DocumentStoreResult<Document> {
        let mut store = self.store.write().await;
        let documents = store
            .entry(collection.to_string())
            .or_default();

        match document.get(ID_FIELD) {
            Some(id) => {
                let duplicate = documents
                    .iter()
                    .any(|stored| stored.get(ID_FIELD) == Some(id));

                if duplicate {
                    return Err(DocumentStoreError::DocumentAlreadyExists(
                        id.to_string(),
                        collection.to_string(),
                    ));
                }
            }
            None => {
                let id = ObjectId::new();
                tracing::trace!(collection, %id, "assigned document id");
                document.insert(ID_FIELD, Bson::ObjectId(id));
            }
        }

        documents.push(document.clone());

        Ok(document)
    }

    async fn read_one_document(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> DocumentStoreResult<Option<Document>> {
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(col) => col,
            None => return Ok(None),
        };

        Ok(position(documents, filter).map(|index| documents[index].clone()))
    }

    async fn update_one_document(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Document,
    ) -> DocumentStoreResult<Document> {
        let mut store = self.store.write().await;
        let documents = match store.get_mut(collection) {
            Some(col) => col,
            None => return Err(not_found(filter, collection)),
        };

        let index = position(documents, filter).ok_or_else(|| not_found(filter, collection))?;
        let document = &mut documents[index];

        for (field, value) in changes {
            document.insert(field, value);
        }

        Ok(document.clone())
    }

    async fn delete_one_document(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<Document> {
        let mut store = self.store.write().await;
        let documents = match store.get_mut(collection) {
            Some(col) => col,
            None => return Err(not_found(filter, collection)),
        };

        let index = position(documents, filter).ok_or_else(|| not_found(filter, collection))?;

        Ok(documents.remove(index))
    }

    async fn query_documents(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        // Apply filter expressions if present
        let mut matched = Vec::with_capacity(documents.len());
        for document in documents {
            let keep = match &query.filter {
                Some(filter) => DocumentEvaluator::new(document).evaluate(filter)?,
                None => true,
            };

            if keep {
                matched.push(document.clone());
            }
        }

        // Stable sort keeps insertion order among equal keys
        if let Some(sort) = &query.sort {
            matched.sort_by(|a, b| {
                let ordering = compare_fields(a.get(&sort.field), b.get(&sort.field));

                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        Ok(
            matched
                .into_iter()
                .skip(query.offset.unwrap_or(0))
                .take(query.limit.unwrap_or(usize::MAX))
                .collect()
        )
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(
            self.store
                .read()
                .await
                .keys()
                .cloned()
                .collect()
        )
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance. Always succeeds.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

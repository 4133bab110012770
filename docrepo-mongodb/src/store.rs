use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, Bson, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions, ReturnDocument},
};
use tracing::warn;
use docrepo_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    codec::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    query::{Query, QueryVisitor, SortDirection},
};

use crate::{sanitizer::KeySanitizer, query::MongoQueryTranslator};

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;


#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&KeySanitizer::sanitize_key(collection_name))
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

fn backend_error(e: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(e.to_string())
}

fn not_found(filter: &Filter, collection: &str) -> DocumentStoreError {
    DocumentStoreError::NotFound(filter.document().to_string(), collection.to_string())
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn create_document(&self, collection: &str, document: Document) -> DocumentStoreResult<Document> {
        let mut document = KeySanitizer::sanitize_document(document);

        let result = self.get_collection(collection)
            .insert_one(&document)
            .await
            .map_err(|e| {
                let duplicate = matches!(
                    e.kind.as_ref(),
                    ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
                );

                if duplicate {
                    DocumentStoreError::DocumentAlreadyExists(
                        document
                            .get(ID_FIELD)
                            .map(Bson::to_string)
                            .unwrap_or_default(),
                        collection.to_string(),
                    )
                } else {
                    backend_error(e)
                }
            })?;

        if !document.contains_key(ID_FIELD) {
            document.insert(ID_FIELD, result.inserted_id);
        }

        Ok(KeySanitizer::restore_document(document))
    }

    async fn read_one_document(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> DocumentStoreResult<Option<Document>> {
        Ok(
            self.get_collection(collection)
                .find_one(MongoQueryTranslator::translate_filter(filter))
                .await
                .map_err(backend_error)?
                .map(KeySanitizer::restore_document)
        )
    }

    async fn update_one_document(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Document,
    ) -> DocumentStoreResult<Document> {
        self.get_collection(collection)
            .find_one_and_update(
                MongoQueryTranslator::translate_filter(filter),
                doc! { "$set": KeySanitizer::sanitize_document(changes) },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(backend_error)?
            .map(KeySanitizer::restore_document)
            .ok_or_else(|| not_found(filter, collection))
    }

    async fn delete_one_document(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<Document> {
        self.get_collection(collection)
            .find_one_and_delete(MongoQueryTranslator::translate_filter(filter))
            .await
            .map_err(backend_error)?
            .map(KeySanitizer::restore_document)
            .ok_or_else(|| not_found(filter, collection))
    }

    async fn query_documents(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if let Some(sort) = &query.sort {
            let field = KeySanitizer::sanitize_key(&sort.field);
            options.sort = Some(doc! {
                field: match sort.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                }
            })
        }

        let filter = match &query.filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr)?,
            None => doc! {},
        };

        Ok(
            self.get_collection(collection)
                .find(filter)
                .with_options(options)
                .await
                .map_err(backend_error)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(backend_error)?
                .into_iter()
                .map(KeySanitizer::restore_document)
                .collect()
        )
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        if self.list_collections().await?.iter().any(|existing| existing == name) {
            return Ok(());
        }

        self.client
            .database(&self.database)
            .create_collection(&KeySanitizer::sanitize_key(name))
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(
            self.client
                .database(&self.database)
                .list_collection_names()
                .await
                .map_err(backend_error)?
                .into_iter()
                .map(|name| KeySanitizer::restore_key(&name))
                .collect()
        )
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        if self.database.is_empty() {
            warn!("building a MongoDB store without a database name");
            return Err(DocumentStoreError::Initialization("database name is empty".to_string()));
        }

        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}

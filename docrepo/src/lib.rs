//! Main docrepo crate providing typed entity persistence over document stores.
//!
//! This crate is the primary entry point for users of the docrepo framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! convenient access to the storage drivers.
//!
//! # Features
//!
//! - **Declared entities** - Plain serde structs with a validated field, key and timestamp declaration
//! - **Autogenerated fields** - Primary keys and `inserted_at`/`updated_at` filled in by the repository
//! - **Changesets** - Sparse updates that only write the fields you changed
//! - **Multiple drivers** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryStore};
//! use bson::Uuid;
//! use chrono::{DateTime, Utc};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct Account {
//!     pub id: Option<Uuid>,
//!     pub nickname: String,
//!     pub email: String,
//!     pub inserted_at: Option<DateTime<Utc>>,
//!     pub updated_at: Option<DateTime<Utc>>,
//! }
//!
//! impl Entity for Account {
//!     fn schema() -> DescriptorBuilder {
//!         EntityDescriptor::builder("accounts")
//!             .primary_key("id", FieldKind::Id, true)
//!             .field("nickname", FieldKind::String)
//!             .field("email", FieldKind::String)
//!             .timestamps()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let repo = Repository::new(InMemoryStore::builder().build().await?);
//!
//!     // Insert: the key and both timestamps are generated
//!     let account = repo
//!         .insert(Account { nickname: "test".into(), email: "test@example.com".into(), ..Default::default() })
//!         .await?;
//!
//!     // Update: only `nickname` and `updated_at` are written
//!     let account = repo
//!         .update(Changeset::new(account).change("nickname", "renamed"))
//!         .await?;
//!
//!     // Lookups by key or by any declared fields
//!     let same: Account = repo.get(account.id.unwrap()).await?;
//!     let found: Option<Account> = repo
//!         .get_by(FieldValues::new().with("nickname", "renamed"))
//!         .await?;
//!
//!     repo.delete(&same).await?;
//!     repo.shutdown().await
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! A repository can erase its driver type with `into_dyn`, which allows selecting the
//! driver at runtime:
//!
//! ```ignore
//! let repo: Repository<Box<dyn DynStoreBackend>> = if use_mongo {
//!     Repository::new(MongoDbStore::builder(dsn, "app").build().await?).into_dyn()
//! } else {
//!     Repository::new(InMemoryStore::new()).into_dyn()
//! };
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB driver (requires `mongodb` feature)

pub mod prelude;

pub use docrepo_core::{
    autogen, backend, changeset, codec, descriptor, entity, error, filter, query, repository,
};
pub use docrepo_core::repository::{Repository, RepositoryBuilder};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage driver implementations.
pub mod memory {
    pub use docrepo_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage driver implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrepo_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}

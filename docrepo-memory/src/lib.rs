//! In-memory storage driver for docrepo.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Driver-assigned keys** - Documents without an `_id` get a fresh `ObjectId`
//! - **Full query support** - Supports filtering, sorting, and pagination
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{Repository, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let repo = Repository::new(backend);
//!
//!     let account = repo.insert(Account::new("test", "test@example.com")).await?;
//!     assert!(account.id.is_some());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_memory;

pub mod store;
pub mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};

//! Typed entity mapping over schemaless document stores.
//!
//! This crate is the core of the docrepo project and provides:
//!
//! - **Entity declarations** ([`entity`], [`descriptor`]) - Serde entities and their validated metadata
//! - **Field codec** ([`codec`]) - Conversion between entity values and wire documents
//! - **Changesets** ([`changeset`]) - Sparse mutation requests over an entity instance
//! - **Autogeneration** ([`autogen`]) - Primary key and timestamp lifecycle rules
//! - **Filters and queries** ([`filter`], [`query`]) - Encoded lookups and typed query expressions
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage drivers
//! - **Repository** ([`repository`]) - The façade applications use
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//! use bson::Uuid;
//! use chrono::{DateTime, Utc};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Account {
//!     pub id: Option<Uuid>,
//!     pub nickname: String,
//!     pub inserted_at: Option<DateTime<Utc>>,
//!     pub updated_at: Option<DateTime<Utc>>,
//! }
//!
//! impl Entity for Account {
//!     fn schema() -> DescriptorBuilder {
//!         EntityDescriptor::builder("accounts")
//!             .primary_key("id", FieldKind::Id, true)
//!             .field("nickname", FieldKind::String)
//!             .timestamps()
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_core;

pub mod autogen;
pub mod backend;
pub mod changeset;
pub mod codec;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod filter;
pub mod query;
pub mod repository;

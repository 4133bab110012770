//! Convenient re-exports of commonly used types from docrepo.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docrepo::prelude::*;
//! ```

pub use docrepo_core::{
    autogen::{Clock, SystemClock},
    backend::{StoreBackend, DynStoreBackend, StoreBackendBuilder},
    changeset::Changeset,
    codec::FieldKind,
    descriptor::{DescriptorBuilder, EntityDescriptor},
    entity::{Entity, EntityExt},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::FieldValues,
    query::{Query, QueryBuilder, Expr, Predicate, Sort, SortDirection, FieldOp},
    repository::{Repository, RepositoryBuilder},
};

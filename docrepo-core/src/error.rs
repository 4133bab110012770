//! Error types and result types for repository and storage operations.
//!
//! Every fallible operation in the workspace returns [`DocumentStoreResult<T>`]. The variants
//! fall into two groups: failures raised by the mapping layer itself (configuration, type
//! mismatches, unknown fields, preconditions, absence) and failures reported by a storage
//! driver, which are carried through untouched.

use bson::error::Error as BsonError;
use thiserror::Error;

use crate::codec::FieldKind;

/// Represents all possible errors that can occur when mapping entities onto a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between entities and BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An entity declaration is malformed. Raised when its descriptor is first resolved.
    /// The first argument is the collection name, the second describes the problem.
    #[error("Invalid declaration for collection {0}: {1}")]
    Configuration(String, String),
    /// A value does not have the shape its declared field kind requires.
    #[error("Type mismatch on field {field}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The field carrying the offending value.
        field: String,
        /// The declared kind of the field.
        expected: FieldKind,
        /// A short description of the value that was found.
        found: String,
    },
    /// A field name is not declared by the entity type.
    /// The first argument is the field name, the second is the collection name.
    #[error("Unknown field {0} for collection {1}")]
    UnknownField(String, String),
    /// The operation is not valid for the entity in its current lifecycle state.
    #[error("Precondition failed: {0}")]
    Precondition(String),
    /// No document matched the lookup.
    /// The first argument describes the lookup, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    NotFound(String, String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error reported by the underlying storage driver, passed through as-is.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

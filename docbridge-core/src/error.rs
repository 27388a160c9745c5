//! Error types and result types for document store operations.
//!
//! Builder calls on [`Accessor`](crate::accessor::Accessor) never produce one of these: they
//! report rejected input through a `false` return and leave the builder untouched. Everything that
//! reaches a backend, parses an id or (de)serializes a document returns a [`DocumentStoreResult<T>`].

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A string could not be parsed into the requested id kind.
    /// The first argument is the id kind, the second the rejected input.
    #[error("Invalid {0} id: {1}")]
    InvalidId(String, String),
    /// The document violates schema constraints or has invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The accessor handed to an operation cannot drive it (e.g. an update without update fragments).
    #[error("Invalid accessor: {0}")]
    InvalidAccessor(String),
    /// A read expecting exactly one document matched more than one.
    #[error("Filter matched more than a single document in collection {0}")]
    MultipleResults(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// The store configuration is inconsistent or names an unavailable backend.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

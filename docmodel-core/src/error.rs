//! Error types and result types for model and store operations.
//!
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//! Variants are split into two families: argument/structure errors raised by the
//! model itself, which are never retried, and store errors raised by a
//! [`StoreBackend`](crate::backend::StoreBackend), which the retry executor may
//! retry and always reports to the configured observer.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when working with models and document stores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentStoreError {
    /// A field path, field name, identifier or configuration value is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A value exceeds the fixed nesting limit.
    #[error("Value at {path} is nested deeper than {limit} levels")]
    TooDeeplyNested { path: String, limit: usize },
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A save hook refused the write.
    #[error("Rejected by hook: {0}")]
    Rejected(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given identifier already exists in the collection.
    /// The first argument is the identifier, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateIdentifier(String, String),
    /// A store error that may succeed when retried (network blip, primary stepdown).
    #[error("Transient store error: {0}")]
    Transient(String),
    /// Any other error raised by the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DocumentStoreError {
    /// Returns `true` for errors raised by a store round-trip.
    ///
    /// Store errors are reported to the write observer and retried up to the
    /// configured attempt ceiling. Every other variant aborts the operation at once.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            DocumentStoreError::DuplicateIdentifier(..)
                | DocumentStoreError::Transient(_)
                | DocumentStoreError::Backend(_)
                | DocumentStoreError::Unknown(_)
        )
    }

    pub fn is_duplicate_identifier(&self) -> bool {
        matches!(self, DocumentStoreError::DuplicateIdentifier(..))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DocumentStoreError::Transient(_))
    }
}

/// A specialized `Result` type for model and store operations.
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

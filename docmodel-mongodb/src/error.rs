//! Classification of driver errors into store errors.

use mongodb::error::{Error as MongoError, ErrorKind, RETRYABLE_WRITE_ERROR, WriteFailure};

use docmodel_core::error::DocumentStoreError;

/// Server code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// Maps a driver error onto the store error families the retry executor understands.
///
/// A unique-key violation becomes `DuplicateIdentifier`, network and topology
/// failures (or anything the server labels retryable) become `Transient`, and
/// everything else becomes `Backend`.
pub(crate) fn classify(error: MongoError, collection: &str) -> DocumentStoreError {
    match *error.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) if write_error.code == DUPLICATE_KEY => {
            DocumentStoreError::DuplicateIdentifier(write_error.message.clone(), collection.to_string())
        }
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            DocumentStoreError::Transient(error.to_string())
        }
        _ if error.contains_label(RETRYABLE_WRITE_ERROR) => DocumentStoreError::Transient(error.to_string()),
        _ => DocumentStoreError::Backend(error.to_string()),
    }
}

//! Bounded retry of single-document writes.
//!
//! The executor issues a write up to `max_attempts` times and classifies each
//! result:
//!
//! - applied: done
//! - matched nothing: the entity is stale, retrying cannot help
//! - duplicate identifier on insert: an earlier attempt already landed
//! - any other store error or an unacknowledged write: report and retry
//! - any non-store error: returned immediately
//!
//! When attempts run out the caller receives [`WriteOutcome::Failed`] with the
//! last store error, and decides whether to surface it.

use std::{fmt, future::Future};

use tracing::debug;

use crate::{
    config::RetryPolicy,
    entity::Entity,
    error::{DocumentStoreError, DocumentStoreResult},
    observer::{WriteFailure, WriteObserver},
};

/// The kind of write being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Insert,
    Upsert,
    SoftDelete,
    Restore,
    HardDelete,
}

impl WriteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteKind::Insert => "insert",
            WriteKind::Upsert => "upsert",
            WriteKind::SoftDelete => "soft_delete",
            WriteKind::Restore => "restore",
            WriteKind::HardDelete => "hard_delete",
        }
    }
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the store answered a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Applied,
    /// The store did not confirm the write.
    Unacknowledged,
    /// The filter matched no document.
    NoMatch,
}

/// Final result of a retried write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Applied,
    /// An insert hit a duplicate identifier after an earlier attempt; the write is in place.
    Converged,
    /// The targeted document is gone.
    Stale,
    Failed {
        attempts: u32,
        /// `None` when every attempt went unacknowledged.
        last_error: Option<DocumentStoreError>,
    },
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Applied | WriteOutcome::Converged)
    }
}

pub struct RetryExecutor<'a> {
    collection: &'a str,
    policy: &'a RetryPolicy,
    observer: &'a dyn WriteObserver,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(collection: &'a str, policy: &'a RetryPolicy, observer: &'a dyn WriteObserver) -> Self {
        Self {
            collection,
            policy,
            observer,
        }
    }

    /// Runs `operation` until it is applied, proves stale, fails fatally or
    /// exhausts the policy's attempts.
    ///
    /// `entity` is only passed through to the observer.
    ///
    /// # Errors
    ///
    /// Returns the first error that is not a store error (see
    /// [`DocumentStoreError::is_store_error`]) without retrying.
    pub async fn execute<F, Fut>(
        &self,
        kind: WriteKind,
        entity: &Entity,
        mut operation: F,
    ) -> DocumentStoreResult<WriteOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DocumentStoreResult<Acknowledgement>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(Acknowledgement::Applied) => return Ok(WriteOutcome::Applied),
                Ok(Acknowledgement::NoMatch) => {
                    debug!(collection = self.collection, operation = %kind, attempt, "write matched no document");
                    return Ok(WriteOutcome::Stale);
                }
                Ok(Acknowledgement::Unacknowledged) => {
                    debug!(collection = self.collection, operation = %kind, attempt, "write was not acknowledged");
                }
                Err(error) if kind == WriteKind::Insert && error.is_duplicate_identifier() => {
                    debug!(collection = self.collection, attempt, "insert converged on existing document");
                    return Ok(WriteOutcome::Converged);
                }
                Err(error) if error.is_store_error() => {
                    self.observer.write_failed(&WriteFailure {
                        operation: kind,
                        collection: self.collection,
                        attempt,
                        max_attempts,
                        error: &error,
                        entity,
                    });
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }

            if attempt < max_attempts {
                if let Some(backoff) = self.policy.backoff {
                    tokio::time::sleep(backoff.delay(attempt)).await;
                }
            }
        }

        Ok(WriteOutcome::Failed {
            attempts: max_attempts,
            last_error,
        })
    }
}

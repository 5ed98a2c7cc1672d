//! Notification of failed write attempts.
//!
//! Every store error raised by an attempt (before any retry) is reported to
//! the model's [`WriteObserver`]. The default [`TracingObserver`] emits a
//! `warn` event; applications can plug in metrics or alerting instead.

use crate::{entity::Entity, error::DocumentStoreError, retry::WriteKind};

/// A single failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct WriteFailure<'a> {
    pub operation: WriteKind,
    pub collection: &'a str,
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: &'a DocumentStoreError,
    /// The entity as it was when the attempt was issued.
    pub entity: &'a Entity,
}

impl WriteFailure<'_> {
    /// Returns `true` if another attempt follows this one.
    pub fn will_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// Receives failed write attempts.
///
/// Called synchronously from the write path. Implementations must not panic.
pub trait WriteObserver: Send + Sync {
    fn write_failed(&self, failure: &WriteFailure<'_>);
}

/// Logs failed attempts through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl WriteObserver for TracingObserver {
    fn write_failed(&self, failure: &WriteFailure<'_>) {
        tracing::warn!(
            collection = failure.collection,
            operation = %failure.operation,
            attempt = failure.attempt,
            max_attempts = failure.max_attempts,
            id = ?failure.entity.id(),
            error = %failure.error,
            will_retry = failure.will_retry(),
            "document write failed"
        );
    }
}

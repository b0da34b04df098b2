//! Error types for clm-reconcile
//!
//! Each collaborator has its own error type; [`ReconcileError`] is the
//! umbrella carried by a fatal requeue signal.

use clm_types::{ProcessGroupId, TypesError};
use thiserror::Error;

/// Errors from the cluster state store and the live process directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The write was based on a stale snapshot.
    #[error("conflict writing {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Locality lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("locality lookup failed: {0}")]
pub struct LocalityError(pub String);

/// Pushing configuration to a live process failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// The process (or its sidecar) could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The process was reached but did not accept the configuration.
    #[error("configuration rejected: {0}")]
    Rejected(String),
}

impl PushError {
    pub fn is_network(&self) -> bool {
        matches!(self, PushError::Network(_))
    }
}

/// Configuration content or per-process parameters could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("process group {process_group_id} is missing metadata {key}")]
    MissingMetadata {
        process_group_id: ProcessGroupId,
        key: &'static str,
    },

    #[error("process group {process_group_id} has malformed metadata {key}={value}: {reason}")]
    MalformedMetadata {
        process_group_id: ProcessGroupId,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("dynamic configuration has no entry {0}")]
    MissingEntry(String),

    #[error("dynamic configuration unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by a reconciliation step.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Locality(#[from] LocalityError),

    #[error("push error: {0}")]
    Push(#[from] PushError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error("reconciliation deadline exceeded")]
    DeadlineExceeded,
}

impl ReconcileError {
    /// Connectivity failures reaching a live process.
    pub fn is_network(&self) -> bool {
        matches!(self, ReconcileError::Push(err) if err.is_network())
    }

    /// The ambient context ended; the pass must stop.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ReconcileError::Cancelled | ReconcileError::DeadlineExceeded
        )
    }

    /// Stale-snapshot write rejected by the state store.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Store(StoreError::Conflict { .. }))
    }
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ReconcileError::from(PushError::Network("refused".into())).is_network());
        assert!(!ReconcileError::from(PushError::Rejected("bad".into())).is_network());
        assert!(ReconcileError::DeadlineExceeded.is_cancellation());
        assert!(ReconcileError::from(StoreError::Conflict {
            key: "default/sample".into(),
            expected: 1,
            actual: 2,
        })
        .is_conflict());
    }
}

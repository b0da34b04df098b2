//! Error types for clm-daemon

use clm_reconcile::ReconcileError;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cluster manifest could not be read or is invalid
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Reconciliation error
    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

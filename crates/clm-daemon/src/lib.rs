//! CLM Daemon library
//!
//! This module provides the core components for the CLM daemon:
//! - Layered configuration
//! - Cluster manifest loading
//! - Per-cluster reconciliation drivers and shutdown handling

pub mod config;
pub mod daemon;
pub mod error;
pub mod manifest;

pub use config::{DaemonConfig, LoggingConfig};
pub use daemon::{shutdown_signal, Daemon};
pub use error::{DaemonError, DaemonResult};
pub use manifest::{ClusterManifest, Manifest};

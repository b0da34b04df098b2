//! CLM Types - core data model for the cluster lifecycle reconciler
//!
//! - [`Cluster`]: declared spec and observed status of a database cluster
//! - [`ProcessGroupDirectory`] / [`ProcessGroupStatus`]: per-group removal
//!   flag, conditions and fault domain
//! - [`LiveProcess`]: the deployed unit behind a process group
//! - [`DynamicConfig`]: configuration content pushed to live processes

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cluster;
pub mod config;
pub mod directory;
pub mod error;
pub mod ids;
pub mod live;
pub mod process_group;

pub use cluster::{Cluster, ClusterMeta, ClusterSpec, ClusterStatus, ProcessCounts};
pub use config::DynamicConfig;
pub use directory::ProcessGroupDirectory;
pub use error::TypesError;
pub use ids::{ClusterKey, ProcessClass, ProcessGroupId};
pub use live::{ImageType, LivePhase, LiveProcess};
pub use process_group::{ProcessGroupCondition, ProcessGroupConditionType, ProcessGroupStatus};

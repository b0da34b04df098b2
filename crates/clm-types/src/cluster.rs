//! Cluster object: declared spec plus observed status

use crate::directory::ProcessGroupDirectory;
use crate::ids::{ClusterKey, ProcessClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Object metadata used for optimistic concurrency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMeta {
    pub namespace: String,
    pub name: String,

    /// Bumped by the state store on every successful write.
    #[serde(default)]
    pub resource_version: u64,
}

/// Desired process count per class. Classes that are absent want zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessCounts(BTreeMap<ProcessClass, u32>);

impl ProcessCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, class: ProcessClass, count: u32) -> Self {
        self.0.insert(class, count);
        self
    }

    pub fn set(&mut self, class: ProcessClass, count: u32) {
        self.0.insert(class, count);
    }

    pub fn desired(&self, class: ProcessClass) -> u32 {
        self.0.get(&class).copied().unwrap_or(0)
    }
}

/// Declared cluster specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Target database version
    pub version: String,

    #[serde(default)]
    pub process_counts: ProcessCounts,
}

/// Observed cluster status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Version the processes currently run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_version: Option<String>,

    #[serde(default)]
    pub process_groups: ProcessGroupDirectory,
}

/// A managed database cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub metadata: ClusterMeta,
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: ClusterStatus,
}

impl Cluster {
    pub fn new(key: &ClusterKey, spec: ClusterSpec) -> Self {
        Self {
            metadata: ClusterMeta {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                resource_version: 0,
            },
            spec,
            status: ClusterStatus::default(),
        }
    }

    pub fn key(&self) -> ClusterKey {
        ClusterKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Whether the cluster is moving between protocol-incompatible
    /// versions, i.e. the running and desired versions differ in major or
    /// minor component. Unknown or unparsable versions never count.
    pub fn is_upgrading_incompatible_version(&self) -> bool {
        let Some(running) = self.status.running_version.as_deref() else {
            return false;
        };
        match (
            semver::Version::parse(running),
            semver::Version::parse(&self.spec.version),
        ) {
            (Ok(running), Ok(desired)) => {
                running.major != desired.major || running.minor != desired.minor
            }
            _ => false,
        }
    }
}

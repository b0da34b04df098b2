//! Cluster manifest
//!
//! A JSON file describing the clusters to drive together with the live
//! processes, zones and dynamic configuration the in-memory collaborators
//! should report for them.

use crate::error::{DaemonError, DaemonResult};
use clm_reconcile::memory::InMemoryCollaborators;
use clm_types::{Cluster, ClusterKey, DynamicConfig, LiveProcess, ProcessGroupId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Everything known about one cluster at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterManifest {
    pub cluster: Cluster,

    #[serde(default)]
    pub processes: Vec<LiveProcess>,

    /// Zone reported by the locality client, per process group
    #[serde(default)]
    pub zones: BTreeMap<ProcessGroupId, String>,

    #[serde(default)]
    pub config: DynamicConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub clusters: Vec<ClusterManifest>,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> DaemonResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw).map_err(|err| match err {
            DaemonError::Manifest(reason) => {
                DaemonError::Manifest(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    pub fn parse(raw: &str) -> DaemonResult<Self> {
        let manifest: Manifest =
            serde_json::from_str(raw).map_err(|err| DaemonError::Manifest(err.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> DaemonResult<()> {
        let mut seen = HashSet::new();
        for entry in &self.clusters {
            let key = entry.cluster.key();
            if !seen.insert(key.clone()) {
                return Err(DaemonError::Manifest(format!("duplicate cluster {}", key)));
            }

            let mut groups = HashSet::new();
            for group in entry.cluster.status.process_groups.iter() {
                if !groups.insert(&group.process_group_id) {
                    return Err(DaemonError::Manifest(format!(
                        "cluster {} lists process group {} twice",
                        key, group.process_group_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load every cluster into the collaborators and return their keys.
    pub fn seed(&self, collaborators: &InMemoryCollaborators) -> Vec<ClusterKey> {
        self.clusters
            .iter()
            .map(|entry| {
                let key = entry.cluster.key();
                collaborators.store.insert(entry.cluster.clone());
                for process in &entry.processes {
                    collaborators.processes.insert(&key, process.clone());
                }
                for (id, zone) in &entry.zones {
                    collaborators.locality.set_zone(&key, id.clone(), zone.clone());
                }
                collaborators.config_source.set(&key, entry.config.clone());
                key
            })
            .collect()
    }
}

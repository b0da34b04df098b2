//! In-memory collaborators for development and testing

use crate::collaborators::{
    ClusterReconciler, ClusterStateStore, ConfigPushChannel, ConfigSource, LiveProcessDirectory,
    LocalityClient,
};
use crate::error::{ConfigError, LocalityError, PushError, StoreError};
use async_trait::async_trait;
use clm_types::{Cluster, ClusterKey, DynamicConfig, LiveProcess, ProcessGroupId};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One of each in-memory collaborator, kept typed so callers can seed and
/// inspect them after handing them to a [`ClusterReconciler`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCollaborators {
    pub store: Arc<InMemoryClusterStore>,
    pub processes: Arc<InMemoryLiveProcessDirectory>,
    pub locality: Arc<StaticLocalityClient>,
    pub config_source: Arc<StaticConfigSource>,
    pub push_channel: Arc<ScriptedPushChannel>,
}

impl InMemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reconciler(&self) -> ClusterReconciler {
        ClusterReconciler::new(
            self.store.clone(),
            self.processes.clone(),
            self.locality.clone(),
            self.config_source.clone(),
            self.push_channel.clone(),
        )
    }
}

/// Cluster objects keyed by namespace/name with optimistic resource versions
#[derive(Debug, Default)]
pub struct InMemoryClusterStore {
    clusters: DashMap<ClusterKey, Cluster>,
    writes: AtomicUsize,
    write_failure: Mutex<Option<String>>,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a cluster object, bumping its resource version.
    pub fn insert(&self, mut cluster: Cluster) -> Cluster {
        let key = cluster.key();
        let version = self
            .clusters
            .get(&key)
            .map(|existing| existing.metadata.resource_version)
            .unwrap_or(0);
        cluster.metadata.resource_version = version + 1;
        self.clusters.insert(key, cluster.clone());
        cluster
    }

    /// Number of successful status writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every status write fail until cleared with `None`.
    pub fn set_write_failure(&self, failure: Option<String>) {
        if let Ok(mut guard) = self.write_failure.lock() {
            *guard = failure;
        }
    }

    fn injected_failure(&self) -> Option<String> {
        self.write_failure.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl ClusterStateStore for InMemoryClusterStore {
    async fn get(&self, key: &ClusterKey) -> Result<Cluster, StoreError> {
        self.clusters
            .get(key)
            .map(|cluster| cluster.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn update_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        if let Some(reason) = self.injected_failure() {
            return Err(StoreError::Storage(reason));
        }

        let key = cluster.key();
        let mut stored = self
            .clusters
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if stored.metadata.resource_version != cluster.metadata.resource_version {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: cluster.metadata.resource_version,
                actual: stored.metadata.resource_version,
            });
        }

        stored.status = cluster.status.clone();
        stored.metadata.resource_version += 1;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }
}

/// Live processes per cluster
#[derive(Debug, Default)]
pub struct InMemoryLiveProcessDirectory {
    processes: DashMap<ClusterKey, BTreeMap<ProcessGroupId, LiveProcess>>,
    metadata_updates: AtomicUsize,
    update_failure: Mutex<Option<String>>,
}

impl InMemoryLiveProcessDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cluster: &ClusterKey, process: LiveProcess) {
        self.processes
            .entry(cluster.clone())
            .or_default()
            .insert(process.process_group_id.clone(), process);
    }

    pub fn get(&self, cluster: &ClusterKey, id: &ProcessGroupId) -> Option<LiveProcess> {
        self.processes
            .get(cluster)
            .and_then(|processes| processes.get(id).cloned())
    }

    pub fn metadata_update_count(&self) -> usize {
        self.metadata_updates.load(Ordering::SeqCst)
    }

    /// Make every metadata update fail until cleared with `None`.
    pub fn set_update_failure(&self, failure: Option<String>) {
        if let Ok(mut guard) = self.update_failure.lock() {
            *guard = failure;
        }
    }
}

#[async_trait]
impl LiveProcessDirectory for InMemoryLiveProcessDirectory {
    async fn list(&self, cluster: &ClusterKey) -> Result<Vec<LiveProcess>, StoreError> {
        Ok(self
            .processes
            .get(cluster)
            .map(|processes| processes.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_metadata(
        &self,
        cluster: &ClusterKey,
        process: &LiveProcess,
    ) -> Result<(), StoreError> {
        if let Some(reason) = self.update_failure.lock().ok().and_then(|g| g.clone()) {
            return Err(StoreError::Storage(reason));
        }

        let mut processes = self
            .processes
            .get_mut(cluster)
            .ok_or_else(|| StoreError::NotFound(cluster.to_string()))?;
        let stored = processes
            .get_mut(&process.process_group_id)
            .ok_or_else(|| StoreError::NotFound(process.process_group_id.to_string()))?;
        stored.metadata = process.metadata.clone();
        self.metadata_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fixed zone assignments
#[derive(Debug, Default)]
pub struct StaticLocalityClient {
    zones: DashMap<(ClusterKey, ProcessGroupId), String>,
    failure: Mutex<Option<String>>,
}

impl StaticLocalityClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_zone(&self, cluster: &ClusterKey, id: ProcessGroupId, zone: impl Into<String>) {
        self.zones.insert((cluster.clone(), id), zone.into());
    }

    /// Make every lookup fail until cleared with `None`.
    pub fn set_failure(&self, failure: Option<String>) {
        if let Ok(mut guard) = self.failure.lock() {
            *guard = failure;
        }
    }
}

#[async_trait]
impl LocalityClient for StaticLocalityClient {
    async fn zone_of(
        &self,
        cluster: &ClusterKey,
        process_group_id: &ProcessGroupId,
    ) -> Result<Option<String>, LocalityError> {
        if let Some(reason) = self.failure.lock().ok().and_then(|g| g.clone()) {
            return Err(LocalityError(reason));
        }
        Ok(self
            .zones
            .get(&(cluster.clone(), process_group_id.clone()))
            .map(|zone| zone.clone()))
    }
}

/// Dynamic configuration per cluster
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    configs: DashMap<ClusterKey, DynamicConfig>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, cluster: &ClusterKey, config: DynamicConfig) {
        self.configs.insert(cluster.clone(), config);
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn dynamic_config(&self, cluster: &Cluster) -> Result<DynamicConfig, ConfigError> {
        let key = cluster.key();
        self.configs
            .get(&key)
            .map(|config| config.clone())
            .ok_or_else(|| ConfigError::Unavailable(format!("no configuration for {}", key)))
    }
}

/// Outcome a [`ScriptedPushChannel`] reports for a process group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Synced,
    NotSynced,
    NetworkError(String),
    Rejected(String),
}

/// Push channel whose per-group outcomes are scripted; unscripted groups
/// sync successfully.
#[derive(Debug, Default)]
pub struct ScriptedPushChannel {
    outcomes: DashMap<ProcessGroupId, PushOutcome>,
    pushes: DashMap<ProcessGroupId, usize>,
}

impl ScriptedPushChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, id: ProcessGroupId, outcome: PushOutcome) {
        self.outcomes.insert(id, outcome);
    }

    pub fn push_count(&self, id: &ProcessGroupId) -> usize {
        self.pushes.get(id).map(|count| *count).unwrap_or(0)
    }

    pub fn total_pushes(&self) -> usize {
        self.pushes.iter().map(|entry| *entry.value()).sum()
    }
}

#[async_trait]
impl ConfigPushChannel for ScriptedPushChannel {
    async fn push(
        &self,
        _cluster: &ClusterKey,
        process: &LiveProcess,
        _config: &DynamicConfig,
    ) -> Result<bool, PushError> {
        *self
            .pushes
            .entry(process.process_group_id.clone())
            .or_default() += 1;

        let outcome = self
            .outcomes
            .get(&process.process_group_id)
            .map(|outcome| outcome.clone())
            .unwrap_or(PushOutcome::Synced);

        match outcome {
            PushOutcome::Synced => Ok(true),
            PushOutcome::NotSynced => Ok(false),
            PushOutcome::NetworkError(reason) => Err(PushError::Network(reason)),
            PushOutcome::Rejected(reason) => Err(PushError::Rejected(reason)),
        }
    }
}

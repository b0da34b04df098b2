//! Collaborator interfaces and the reconciler handle
//!
//! The core never talks to the object store, the process manager or the
//! database admin interface directly. It calls through these traits, which
//! are held by [`ClusterReconciler`] and passed to every subreconciler.

use crate::config::ReconcilerConfig;
use crate::context::ReconcileContext;
use crate::error::{ConfigError, LocalityError, PushError, ReconcileResult, StoreError};
use crate::fingerprint::{self, Fingerprint};
use async_trait::async_trait;
use clm_types::{
    Cluster, ClusterKey, ClusterStatus, DynamicConfig, ImageType, LiveProcess, ProcessClass,
    ProcessGroupId,
};
use std::sync::Arc;
use tracing::debug;

/// Persists cluster objects with optimistic concurrency
#[async_trait]
pub trait ClusterStateStore: Send + Sync {
    /// Read the current cluster object
    async fn get(&self, key: &ClusterKey) -> Result<Cluster, StoreError>;

    /// Write the cluster's status. Fails with [`StoreError::Conflict`] if
    /// `cluster.metadata.resource_version` is stale. Returns the stored
    /// object with its new resource version.
    async fn update_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError>;
}

/// Lists and annotates the deployed units behind process groups
#[async_trait]
pub trait LiveProcessDirectory: Send + Sync {
    async fn list(&self, cluster: &ClusterKey) -> Result<Vec<LiveProcess>, StoreError>;

    async fn update_metadata(
        &self,
        cluster: &ClusterKey,
        process: &LiveProcess,
    ) -> Result<(), StoreError>;
}

/// Reports where running processes are placed
#[async_trait]
pub trait LocalityClient: Send + Sync {
    /// Zone of the process group, or `None` if the database does not know it.
    async fn zone_of(
        &self,
        cluster: &ClusterKey,
        process_group_id: &ProcessGroupId,
    ) -> Result<Option<String>, LocalityError>;
}

/// Supplies the desired dynamic configuration
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn dynamic_config(&self, cluster: &Cluster) -> Result<DynamicConfig, ConfigError>;

    fn fingerprint(
        &self,
        config: &DynamicConfig,
        process_class: ProcessClass,
        image_type: ImageType,
        servers_per_pod: u32,
    ) -> Result<Fingerprint, ConfigError> {
        fingerprint::compute(config, process_class, image_type, servers_per_pod)
    }
}

/// Delivers configuration to a live process
#[async_trait]
pub trait ConfigPushChannel: Send + Sync {
    /// Returns `true` once the process has the configuration in place.
    async fn push(
        &self,
        cluster: &ClusterKey,
        process: &LiveProcess,
        config: &DynamicConfig,
    ) -> Result<bool, PushError>;
}

/// Handle given to every subreconciler
pub struct ClusterReconciler {
    pub store: Arc<dyn ClusterStateStore>,
    pub processes: Arc<dyn LiveProcessDirectory>,
    pub locality: Arc<dyn LocalityClient>,
    pub config_source: Arc<dyn ConfigSource>,
    pub push_channel: Arc<dyn ConfigPushChannel>,
    pub config: ReconcilerConfig,
}

impl ClusterReconciler {
    pub fn new(
        store: Arc<dyn ClusterStateStore>,
        processes: Arc<dyn LiveProcessDirectory>,
        locality: Arc<dyn LocalityClient>,
        config_source: Arc<dyn ConfigSource>,
        push_channel: Arc<dyn ConfigPushChannel>,
    ) -> Self {
        Self {
            store,
            processes,
            locality,
            config_source,
            push_channel,
            config: ReconcilerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist the cluster's status if it differs from `previous`.
    /// Returns whether a write happened.
    pub async fn write_if_changed(
        &self,
        ctx: &ReconcileContext,
        previous: &ClusterStatus,
        cluster: &mut Cluster,
    ) -> ReconcileResult<bool> {
        if cluster.status == *previous {
            return Ok(false);
        }

        let stored = ctx.run(self.store.update_status(cluster)).await?;
        cluster.metadata.resource_version = stored.metadata.resource_version;

        debug!(
            cluster = %cluster.key(),
            resource_version = cluster.metadata.resource_version,
            "Cluster status updated"
        );

        Ok(true)
    }
}

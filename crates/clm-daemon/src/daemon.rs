//! Daemon lifecycle

use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::manifest::Manifest;
use clm_reconcile::memory::InMemoryCollaborators;
use clm_reconcile::{ReconcileContext, Scheduler};
use clm_types::ClusterKey;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

/// CLM Daemon
pub struct Daemon {
    collaborators: InMemoryCollaborators,
    scheduler: Arc<Scheduler>,
    clusters: Vec<ClusterKey>,
}

impl Daemon {
    /// Build the collaborators and scheduler and seed them from `manifest`.
    pub fn new(config: DaemonConfig, manifest: &Manifest) -> Self {
        let collaborators = InMemoryCollaborators::new();
        let clusters = manifest.seed(&collaborators);
        let reconciler = collaborators.reconciler().with_config(config.reconciler);

        Self {
            collaborators,
            scheduler: Arc::new(Scheduler::new(Arc::new(reconciler))),
            clusters,
        }
    }

    pub fn collaborators(&self) -> &InMemoryCollaborators {
        &self.collaborators
    }

    pub fn clusters(&self) -> &[ClusterKey] {
        &self.clusters
    }

    /// Drive every cluster until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> DaemonResult<()> {
        let (cancel, ctx) = ReconcileContext::new();
        let mut drivers = JoinSet::new();

        for key in self.clusters.iter().cloned() {
            let scheduler = self.scheduler.clone();
            let ctx = ctx.clone();
            drivers.spawn(async move { scheduler.drive(&ctx, &key).await });
        }

        tracing::info!(clusters = self.clusters.len(), "CLM daemon running");

        shutdown.await;
        tracing::info!("CLM daemon shutting down");
        cancel.cancel();

        while let Some(result) = drivers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Cluster driver panicked");
            }
        }

        Ok(())
    }
}

/// Resolve once the process is asked to stop (SIGINT, or SIGTERM on unix).
///
/// A handler that cannot be installed is logged and never fires, so the
/// other one still works.
pub async fn shutdown_signal() {
    let received = tokio::select! {
        () = interrupt() => "SIGINT",
        () = terminate() => "SIGTERM",
    };
    tracing::info!(signal = received, "Stopping cluster drivers");
}

async fn interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, signal = "SIGINT", "Signal handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            tracing::warn!(error = %err, signal = "SIGTERM", "Signal handler unavailable");
            return std::future::pending().await;
        }
    };
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ClusterManifest;
    use clm_reconcile::ClusterStateStore;
    use clm_types::{
        Cluster, ClusterSpec, ProcessClass, ProcessCounts, ProcessGroupId, ProcessGroupStatus,
    };
    use std::time::Duration;

    fn manifest() -> Manifest {
        let key = ClusterKey::new("default", "sample");
        let mut cluster = Cluster::new(
            &key,
            ClusterSpec {
                version: "7.1.25".into(),
                process_counts: ProcessCounts::new().with(ProcessClass::Storage, 1),
            },
        );
        for ordinal in 1..=2 {
            cluster.status.process_groups.insert(ProcessGroupStatus::new(
                ProcessGroupId::new(ProcessClass::Storage, ordinal),
                ProcessClass::Storage,
            ));
        }

        Manifest {
            clusters: vec![ClusterManifest {
                cluster,
                processes: Vec::new(),
                zones: Default::default(),
                config: Default::default(),
            }],
        }
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let daemon = Daemon::new(DaemonConfig::default(), &manifest());
        let key = daemon.clusters()[0].clone();
        let store = daemon.collaborators().store.clone();

        daemon
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        let cluster = store.get(&key).await.unwrap();
        assert_eq!(
            cluster.status.process_groups.removals(),
            vec![ProcessGroupId::new(ProcessClass::Storage, 2)]
        );
    }
}

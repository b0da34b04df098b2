//! Configuration convergence
//!
//! Pushes the desired dynamic configuration to every live process whose
//! last applied fingerprint is out of date, tracks `SidecarUnreachable` and
//! `IncorrectConfigMap` conditions, and reports one requeue signal for the
//! whole pass. A failure on one process group never stops the others.

use crate::collaborators::ClusterReconciler;
use crate::context::ReconcileContext;
use crate::error::{ReconcileError, ReconcileResult};
use crate::fingerprint;
use crate::requeue::{Requeue, Subreconciler};
use async_trait::async_trait;
use chrono::Utc;
use clm_types::{
    Cluster, ClusterKey, DynamicConfig, LivePhase, LiveProcess, ProcessGroupConditionType,
    ProcessGroupId, ProcessGroupStatus,
};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument};

/// Subreconciler bringing live processes onto the current configuration
#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateProcessConfig;

/// Shared inputs for one pass
struct SyncTarget<'a> {
    key: &'a ClusterKey,
    config: &'a DynamicConfig,
    upgrading: bool,
}

/// Bookkeeping accumulated over one pass
struct SyncPass {
    all_synced: bool,
    delayed_requeue: bool,
    errors: Vec<ReconcileError>,
}

impl Default for SyncPass {
    fn default() -> Self {
        Self {
            all_synced: true,
            delayed_requeue: true,
            errors: Vec::new(),
        }
    }
}

impl SyncPass {
    /// Keep a per-group error. Cancellation is handed back so the pass stops.
    fn collect(&mut self, err: ReconcileError) -> ReconcileResult<()> {
        if err.is_cancellation() {
            return Err(err);
        }
        self.all_synced = false;
        self.errors.push(err);
        Ok(())
    }
}

#[async_trait]
impl Subreconciler for UpdateProcessConfig {
    fn name(&self) -> &'static str {
        "update_process_config"
    }

    #[instrument(
        skip_all,
        fields(
            namespace = %cluster.metadata.namespace,
            cluster = %cluster.metadata.name,
            reconciler = "update_process_config"
        )
    )]
    async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        reconciler: &ClusterReconciler,
        cluster: &mut Cluster,
    ) -> Option<Requeue> {
        let config = match ctx
            .run(reconciler.config_source.dynamic_config(cluster))
            .await
        {
            Ok(config) => config,
            Err(err) => return Some(Requeue::error(err)),
        };

        let key = cluster.key();
        let processes = match ctx.run(reconciler.processes.list(&key)).await {
            Ok(processes) => processes,
            Err(err) => return Some(Requeue::error(err)),
        };
        let mut process_map: HashMap<ProcessGroupId, LiveProcess> = processes
            .into_iter()
            .map(|process| (process.process_group_id.clone(), process))
            .collect();

        let target = SyncTarget {
            key: &key,
            config: &config,
            upgrading: cluster.is_upgrading_incompatible_version(),
        };
        let original_status = cluster.status.clone();
        let mut pass = SyncPass::default();

        for group in cluster.status.process_groups.iter_mut() {
            let id = group.process_group_id.clone();

            if group.is_marked_for_removal() {
                debug!(process_group_id = %id, "Ignore process group marked for removal");
                continue;
            }

            let Some(process) = process_map.get_mut(&id) else {
                info!(process_group_id = %id, "Could not find live process for process group");
                continue;
            };

            if group.has_condition(ProcessGroupConditionType::PodPending)
                || process.phase == LivePhase::Pending
            {
                info!(process_group_id = %id, "Process group has pending process, will be skipped");
                continue;
            }

            if let Err(err) = sync_group(ctx, reconciler, &target, group, process, &mut pass).await
            {
                return Some(Requeue::error(err));
            }
        }

        if let Err(err) = reconciler
            .write_if_changed(ctx, &original_status, cluster)
            .await
        {
            return Some(Requeue::error(err));
        }

        // Individual errors were logged where they happened.
        if !pass.errors.is_empty() {
            return Some(Requeue::message(
                "errors occurred during process config reconcile",
            ));
        }

        if !pass.all_synced {
            return Some(Requeue::after(
                "Waiting for processes to receive configuration update",
                reconciler.config.pod_scheduling_delay(),
                pass.delayed_requeue,
            ));
        }

        None
    }
}

/// Converge one process group. Only cancellation is returned as an error;
/// everything else is folded into `pass`.
async fn sync_group(
    ctx: &ReconcileContext,
    reconciler: &ClusterReconciler,
    target: &SyncTarget<'_>,
    group: &mut ProcessGroupStatus,
    process: &mut LiveProcess,
    pass: &mut SyncPass,
) -> ReconcileResult<()> {
    let id = group.process_group_id.clone();

    let fingerprint = match fingerprint::resolve_parameters(process).and_then(|params| {
        reconciler.config_source.fingerprint(
            target.config,
            params.process_class,
            params.image_type,
            params.servers_per_pod,
        )
    }) {
        Ok(fingerprint) => fingerprint,
        Err(err) => {
            error!(process_group_id = %id, error = %err, "Could not compute configuration fingerprint");
            return pass.collect(err.into());
        }
    };

    // During an incompatible upgrade the content stays the same but the
    // push still has to run to gate the coordinated restart.
    if process.last_applied_fingerprint() == Some(fingerprint.as_str()) && !target.upgrading {
        return Ok(());
    }

    let (synced, push_error) = match ctx
        .run(reconciler.push_channel.push(target.key, process, target.config))
        .await
    {
        Ok(synced) => (synced, None),
        Err(err) if err.is_cancellation() => return Err(err),
        Err(err) => (false, Some(err)),
    };

    if !synced {
        pass.all_synced = false;
        if let Some(err) = &push_error {
            error!(process_group_id = %id, error = %err, "Could not push configuration to process");
        }

        let now = Utc::now();
        let network = push_error.as_ref().is_some_and(ReconcileError::is_network);
        if network && !group.has_condition(ProcessGroupConditionType::SidecarUnreachable) {
            info!(process_group_id = %id, "Process group sidecar is not reachable");
            group.observe_condition(ProcessGroupConditionType::SidecarUnreachable, now);
        } else if !group.has_condition(ProcessGroupConditionType::IncorrectConfigMap) {
            group.observe_condition(ProcessGroupConditionType::IncorrectConfigMap, now);
            // Processes waiting only on configuration are restarted together,
            // so their retry must not be stretched by backoff.
            pass.delayed_requeue = false;
        }

        process.mark_outdated(now);
        if let Err(err) = ctx
            .run(reconciler.processes.update_metadata(target.key, process))
            .await
        {
            error!(process_group_id = %id, error = %err, "Could not record outdated configuration");
            pass.collect(err)?;
        }
        return Ok(());
    }

    if process.last_applied_fingerprint() != Some(fingerprint.as_str()) {
        process.set_last_applied_fingerprint(fingerprint.as_str());
        process.clear_outdated();
        if let Err(err) = ctx
            .run(reconciler.processes.update_metadata(target.key, process))
            .await
        {
            error!(process_group_id = %id, error = %err, "Could not record applied configuration");
            pass.collect(err)?;
        }
    }

    if group.clear_condition(ProcessGroupConditionType::SidecarUnreachable) {
        info!(process_group_id = %id, "Process group sidecar is reachable again");
    }

    Ok(())
}

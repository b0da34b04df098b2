//! Removal selection against in-memory collaborators

use chrono::Utc;
use clm_reconcile::memory::InMemoryCollaborators;
use clm_reconcile::{
    ChooseRemovals, ClusterReconciler, ClusterStateStore, ReconcileContext, Requeue, Subreconciler,
};
use clm_types::{
    Cluster, ClusterKey, ClusterSpec, ProcessClass, ProcessCounts, ProcessGroupDirectory,
    ProcessGroupId, ProcessGroupStatus,
};

struct Harness {
    collaborators: InMemoryCollaborators,
    reconciler: ClusterReconciler,
    key: ClusterKey,
}

impl Harness {
    /// Four storage groups and one cluster controller, desiring the same.
    fn new() -> Self {
        let collaborators = InMemoryCollaborators::new();
        let key = ClusterKey::new("default", "sample");

        let mut groups: Vec<_> = (1..=4)
            .map(|ordinal| {
                ProcessGroupStatus::new(
                    ProcessGroupId::new(ProcessClass::Storage, ordinal),
                    ProcessClass::Storage,
                )
            })
            .collect();
        groups.push(ProcessGroupStatus::new(
            ProcessGroupId::new(ProcessClass::ClusterController, 1),
            ProcessClass::ClusterController,
        ));

        let mut cluster = Cluster::new(
            &key,
            ClusterSpec {
                version: "7.1.25".into(),
                process_counts: ProcessCounts::new()
                    .with(ProcessClass::Storage, 4)
                    .with(ProcessClass::ClusterController, 1),
            },
        );
        cluster.status.process_groups = ProcessGroupDirectory::new(groups);
        collaborators.store.insert(cluster);

        let reconciler = collaborators.reconciler();
        Self {
            collaborators,
            reconciler,
            key,
        }
    }

    async fn cluster(&self) -> Cluster {
        self.collaborators.store.get(&self.key).await.unwrap()
    }

    async fn set_desired(&self, class: ProcessClass, count: u32) {
        let mut cluster = self.cluster().await;
        cluster.spec.process_counts.set(class, count);
        self.collaborators.store.insert(cluster);
    }

    async fn reconcile(&self) -> Option<Requeue> {
        let mut cluster = self.cluster().await;
        ChooseRemovals
            .reconcile(&ReconcileContext::background(), &self.reconciler, &mut cluster)
            .await
    }

    async fn removals(&self) -> Vec<ProcessGroupId> {
        self.cluster().await.status.process_groups.removals()
    }
}

fn ids(raw: &[&str]) -> Vec<ProcessGroupId> {
    raw.iter().map(|id| ProcessGroupId::from_raw(*id)).collect()
}

#[tokio::test]
async fn test_reconciled_cluster_removes_nothing() {
    let harness = Harness::new();
    assert!(harness.reconcile().await.is_none());
    assert!(harness.removals().await.is_empty());
    assert_eq!(harness.collaborators.store.write_count(), 0);
}

#[tokio::test]
async fn test_shrink_removes_highest_ordinal() {
    let harness = Harness::new();
    harness.set_desired(ProcessClass::Storage, 3).await;

    assert!(harness.reconcile().await.is_none());
    assert_eq!(harness.removals().await, ids(&["storage-4"]));
}

#[tokio::test]
async fn test_existing_removal_counts_toward_target() {
    let harness = Harness::new();
    harness.set_desired(ProcessClass::Storage, 3).await;

    let mut cluster = harness.cluster().await;
    assert!(cluster
        .status
        .process_groups
        .mark_for_removal(&ProcessGroupId::from_raw("storage-2"), Utc::now()));
    harness
        .collaborators
        .store
        .update_status(&cluster)
        .await
        .unwrap();

    assert!(harness.reconcile().await.is_none());
    assert_eq!(harness.removals().await, ids(&["storage-2"]));
}

#[tokio::test]
async fn test_shared_zone_drained_first() {
    let harness = Harness::new();
    harness.set_desired(ProcessClass::Storage, 3).await;

    let locality = &harness.collaborators.locality;
    locality.set_zone(&harness.key, ProcessGroupId::from_raw("storage-1"), "r1");
    locality.set_zone(&harness.key, ProcessGroupId::from_raw("storage-2"), "r1");
    locality.set_zone(&harness.key, ProcessGroupId::from_raw("storage-3"), "r2");
    locality.set_zone(&harness.key, ProcessGroupId::from_raw("storage-4"), "r3");

    assert!(harness.reconcile().await.is_none());
    assert_eq!(harness.removals().await, ids(&["storage-2"]));
}

#[tokio::test]
async fn test_every_class_is_shrunk() {
    let harness = Harness::new();
    harness.set_desired(ProcessClass::Storage, 3).await;
    harness.set_desired(ProcessClass::ClusterController, 0).await;

    assert!(harness.reconcile().await.is_none());
    assert_eq!(
        harness.removals().await,
        ids(&["cluster_controller-1", "storage-4"])
    );
    assert_eq!(harness.collaborators.store.write_count(), 1);
}

#[tokio::test]
async fn test_repeated_pass_is_stable() {
    let harness = Harness::new();
    harness.set_desired(ProcessClass::Storage, 3).await;

    assert!(harness.reconcile().await.is_none());
    let first = harness.cluster().await;
    assert!(harness.reconcile().await.is_none());
    let second = harness.cluster().await;

    assert_eq!(first.status, second.status);
    assert_eq!(harness.collaborators.store.write_count(), 1);
}

#[tokio::test]
async fn test_recorded_fault_domain_used_without_locality() {
    let harness = Harness::new();
    harness.set_desired(ProcessClass::Storage, 3).await;

    let mut cluster = harness.cluster().await;
    for group in cluster.status.process_groups.iter_mut() {
        let zone = match group.process_group_id.as_str() {
            "storage-1" | "storage-3" => "shared",
            other => other,
        };
        group.fault_domain = Some(zone.to_string());
    }
    harness
        .collaborators
        .store
        .update_status(&cluster)
        .await
        .unwrap();

    assert!(harness.reconcile().await.is_none());
    assert_eq!(harness.removals().await, ids(&["storage-3"]));
}

#[tokio::test]
async fn test_unzoned_group_is_its_own_zone() {
    let harness = Harness::new();
    harness.set_desired(ProcessClass::Storage, 3).await;

    // A zone label that happens to spell another group's id.
    harness.collaborators.locality.set_zone(
        &harness.key,
        ProcessGroupId::from_raw("storage-2"),
        "storage-1",
    );

    assert!(harness.reconcile().await.is_none());
    assert_eq!(harness.removals().await, ids(&["storage-4"]));
}

#[tokio::test]
async fn test_locality_failure_is_fatal() {
    let harness = Harness::new();
    harness.set_desired(ProcessClass::Storage, 3).await;
    harness
        .collaborators
        .locality
        .set_failure(Some("database unavailable".into()));

    let signal = harness.reconcile().await;
    assert!(matches!(signal, Some(Requeue::Error(_))));
    assert!(harness.removals().await.is_empty());
}

#[tokio::test]
async fn test_stale_snapshot_is_fatal() {
    let harness = Harness::new();
    harness.set_desired(ProcessClass::Storage, 3).await;

    let mut stale = harness.cluster().await;
    // Another writer gets in first.
    let fresh = harness.cluster().await;
    harness
        .collaborators
        .store
        .update_status(&fresh)
        .await
        .unwrap();

    let signal = ChooseRemovals
        .reconcile(&ReconcileContext::background(), &harness.reconciler, &mut stale)
        .await;
    match signal {
        Some(Requeue::Error(err)) => assert!(err.is_conflict()),
        other => panic!("expected conflict, got {:?}", other),
    }
}

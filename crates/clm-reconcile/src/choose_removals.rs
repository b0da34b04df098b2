//! Removal selection
//!
//! When a class has more live process groups than desired, pick which ones
//! to flag for removal. Groups that share a zone with another candidate go
//! first, so the survivors end up spread over as many zones as possible.
//! Within the same rank the highest ordinal goes first.

use crate::collaborators::ClusterReconciler;
use crate::context::ReconcileContext;
use crate::requeue::{Requeue, Subreconciler};
use async_trait::async_trait;
use chrono::Utc;
use clm_types::{Cluster, ProcessGroupId};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Fault domain a candidate is counted in
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Zone {
    /// Reported by the locality client or recorded on the group.
    Named(String),
    /// No locality data; the group shares its zone with nobody.
    Isolated(ProcessGroupId),
}

impl From<&str> for Zone {
    fn from(zone: &str) -> Self {
        Zone::Named(zone.to_string())
    }
}

impl From<String> for Zone {
    fn from(zone: String) -> Self {
        Zone::Named(zone)
    }
}

/// A live, unflagged process group eligible for removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalCandidate {
    pub process_group_id: ProcessGroupId,
    pub zone: Zone,
}

impl RemovalCandidate {
    pub fn new(process_group_id: ProcessGroupId, zone: impl Into<Zone>) -> Self {
        Self {
            process_group_id,
            zone: zone.into(),
        }
    }
}

/// Choose `count` groups to remove from `pool`.
///
/// Each round removes the candidate ranked highest by (members in its
/// zone, ordinal, id) and recomputes zone occupancy. The result is a pure
/// function of the pool's contents, independent of its order.
pub fn select_removals(mut pool: Vec<RemovalCandidate>, count: usize) -> Vec<ProcessGroupId> {
    let mut selected = Vec::with_capacity(count.min(pool.len()));

    while selected.len() < count {
        let index = {
            let mut occupancy: BTreeMap<&Zone, usize> = BTreeMap::new();
            for candidate in &pool {
                *occupancy.entry(&candidate.zone).or_default() += 1;
            }

            let zone_size = |c: &RemovalCandidate| occupancy.get(&c.zone).copied().unwrap_or(0);

            pool.iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    zone_size(*a)
                        .cmp(&zone_size(*b))
                        .then_with(|| compare_identity(&a.process_group_id, &b.process_group_id))
                })
                .map(|(index, _)| index)
        };

        match index {
            Some(index) => selected.push(pool.swap_remove(index).process_group_id),
            None => break,
        }
    }

    selected
}

// Ordinal first (ids without one rank lowest), then the id string.
fn compare_identity(a: &ProcessGroupId, b: &ProcessGroupId) -> Ordering {
    a.ordinal().cmp(&b.ordinal()).then_with(|| a.cmp(b))
}

/// Subreconciler flagging surplus process groups for removal
#[derive(Debug, Default, Clone, Copy)]
pub struct ChooseRemovals;

#[async_trait]
impl Subreconciler for ChooseRemovals {
    fn name(&self) -> &'static str {
        "choose_removals"
    }

    #[instrument(
        skip_all,
        fields(
            namespace = %cluster.metadata.namespace,
            cluster = %cluster.metadata.name,
            reconciler = "choose_removals"
        )
    )]
    async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        reconciler: &ClusterReconciler,
        cluster: &mut Cluster,
    ) -> Option<Requeue> {
        let key = cluster.key();
        let mut removals = Vec::new();

        for (class, groups) in cluster.status.process_groups.by_class() {
            let live: Vec<_> = groups
                .into_iter()
                .filter(|group| !group.is_marked_for_removal())
                .collect();
            let desired = cluster.spec.process_counts.desired(class) as usize;
            if live.len() <= desired {
                continue;
            }
            let needed = live.len() - desired;

            let mut pool = Vec::with_capacity(live.len());
            for group in live {
                let zone = match ctx
                    .run(reconciler.locality.zone_of(&key, &group.process_group_id))
                    .await
                {
                    Ok(zone) => zone,
                    Err(err) => return Some(Requeue::error(err)),
                };
                let zone = match zone.or_else(|| group.fault_domain.clone()) {
                    Some(zone) => Zone::Named(zone),
                    None => Zone::Isolated(group.process_group_id.clone()),
                };
                pool.push(RemovalCandidate::new(group.process_group_id.clone(), zone));
            }

            let chosen = select_removals(pool, needed);
            info!(
                process_class = %class,
                desired = desired,
                removals = ?chosen,
                "Choosing process groups to remove"
            );
            removals.extend(chosen);
        }

        if removals.is_empty() {
            debug!("No process groups to remove");
            return None;
        }

        let original_status = cluster.status.clone();
        let now = Utc::now();
        for id in &removals {
            if cluster.status.process_groups.mark_for_removal(id, now) {
                info!(process_group_id = %id, "Marking process group for removal");
            }
        }

        if let Err(err) = reconciler
            .write_if_changed(ctx, &original_status, cluster)
            .await
        {
            return Some(Requeue::error(err));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clm_types::ProcessClass;
    use proptest::prelude::*;

    fn storage(ordinal: u64, zone: &str) -> RemovalCandidate {
        RemovalCandidate::new(ProcessGroupId::new(ProcessClass::Storage, ordinal), zone)
    }

    fn ids(ordinals: &[u64]) -> Vec<ProcessGroupId> {
        ordinals
            .iter()
            .map(|o| ProcessGroupId::new(ProcessClass::Storage, *o))
            .collect()
    }

    #[test]
    fn test_highest_ordinal_without_skew() {
        let pool = vec![storage(1, "a"), storage(2, "b"), storage(3, "c"), storage(4, "d")];
        assert_eq!(select_removals(pool, 1), ids(&[4]));
    }

    #[test]
    fn test_duplicate_zone_drained_first() {
        let pool = vec![storage(1, "r1"), storage(2, "r1"), storage(3, "c"), storage(4, "d")];
        assert_eq!(select_removals(pool, 1), ids(&[2]));
    }

    #[test]
    fn test_most_occupied_zone_first() {
        let pool = vec![
            storage(1, "r1"),
            storage(2, "r1"),
            storage(3, "r2"),
            storage(4, "r2"),
            storage(5, "r2"),
            storage(6, "r3"),
        ];
        // r2 drops to two members, then r1 and r2 tie and ordinals decide.
        assert_eq!(select_removals(pool, 3), ids(&[5, 4, 2]));
    }

    #[test]
    fn test_ordinals_compare_numerically() {
        let pool = vec![storage(9, "a"), storage(10, "b")];
        assert_eq!(select_removals(pool, 1), ids(&[10]));
    }

    #[test]
    fn test_unzoned_group_never_shares_a_zone() {
        // A zone label equal to another group's id is still a different zone.
        let unzoned = ProcessGroupId::new(ProcessClass::Storage, 1);
        let pool = vec![
            RemovalCandidate::new(unzoned.clone(), Zone::Isolated(unzoned)),
            storage(2, "storage-1"),
            storage(3, "b"),
        ];
        assert_eq!(select_removals(pool, 1), ids(&[3]));
    }

    #[test]
    fn test_pool_exhaustion() {
        let pool = vec![storage(1, "a"), storage(2, "a")];
        assert_eq!(select_removals(pool, 5).len(), 2);
        assert!(select_removals(Vec::new(), 3).is_empty());
        assert!(select_removals(vec![storage(1, "a")], 0).is_empty());
    }

    fn pool_strategy() -> impl Strategy<Value = Vec<RemovalCandidate>> {
        proptest::collection::btree_map(1u64..64, 0u8..4, 0..24).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(ordinal, zone)| storage(ordinal, &format!("z{}", zone)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn property_selects_min_of_count_and_pool(pool in pool_strategy(), count in 0usize..30) {
            let selected = select_removals(pool.clone(), count);
            prop_assert_eq!(selected.len(), count.min(pool.len()));

            let mut unique = selected.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), selected.len());
            for id in &selected {
                prop_assert!(pool.iter().any(|c| &c.process_group_id == id));
            }
        }

        #[test]
        fn property_independent_of_pool_order(pool in pool_strategy(), count in 0usize..30) {
            let mut reversed = pool.clone();
            reversed.reverse();
            prop_assert_eq!(select_removals(pool, count), select_removals(reversed, count));
        }

        #[test]
        fn property_never_worsens_zone_spread(pool in pool_strategy(), count in 0usize..30) {
            let zones_before: std::collections::BTreeSet<_> =
                pool.iter().map(|c| c.zone.clone()).collect();
            let selected = select_removals(pool.clone(), count);
            let survivors: Vec<_> = pool
                .iter()
                .filter(|c| !selected.contains(&c.process_group_id))
                .collect();
            let zones_after: std::collections::BTreeSet<_> =
                survivors.iter().map(|c| c.zone.clone()).collect();
            // Zones only disappear once every zone is down to one member.
            prop_assert_eq!(zones_after.len(), zones_before.len().min(survivors.len()));
        }
    }
}

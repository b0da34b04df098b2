//! Process Group Directory
//!
//! In-memory view of every process group recorded in a cluster's status.
//! A reconciliation pass owns its copy exclusively and writes it back only
//! when it differs from the snapshot taken at the start of the pass.

use crate::ids::{ProcessClass, ProcessGroupId};
use crate::process_group::ProcessGroupStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessGroupDirectory(Vec<ProcessGroupStatus>);

impl ProcessGroupDirectory {
    pub fn new(groups: Vec<ProcessGroupStatus>) -> Self {
        Self(groups)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessGroupStatus> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ProcessGroupStatus> {
        self.0.iter_mut()
    }

    pub fn get(&self, id: &ProcessGroupId) -> Option<&ProcessGroupStatus> {
        self.0.iter().find(|g| &g.process_group_id == id)
    }

    pub fn get_mut(&mut self, id: &ProcessGroupId) -> Option<&mut ProcessGroupStatus> {
        self.0.iter_mut().find(|g| &g.process_group_id == id)
    }

    /// Add a group. Ids are unique; an existing entry is kept as is.
    pub fn insert(&mut self, group: ProcessGroupStatus) -> bool {
        if self.get(&group.process_group_id).is_some() {
            return false;
        }
        self.0.push(group);
        true
    }

    /// Groups partitioned by class, in class order.
    pub fn by_class(&self) -> BTreeMap<ProcessClass, Vec<&ProcessGroupStatus>> {
        let mut classes: BTreeMap<ProcessClass, Vec<&ProcessGroupStatus>> = BTreeMap::new();
        for group in &self.0 {
            classes.entry(group.process_class).or_default().push(group);
        }
        classes
    }

    /// Flag a group for removal. Returns `true` only if the flag was newly set.
    pub fn mark_for_removal(&mut self, id: &ProcessGroupId, now: DateTime<Utc>) -> bool {
        self.get_mut(id)
            .map(|group| group.mark_for_removal(now))
            .unwrap_or(false)
    }

    /// Ids of every group flagged for removal, sorted.
    pub fn removals(&self) -> Vec<ProcessGroupId> {
        let mut ids: Vec<_> = self
            .0
            .iter()
            .filter(|g| g.is_marked_for_removal())
            .map(|g| g.process_group_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl FromIterator<ProcessGroupStatus> for ProcessGroupDirectory {
    fn from_iter<T: IntoIterator<Item = ProcessGroupStatus>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

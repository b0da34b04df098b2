//! Process group status as recorded in the cluster object
//!
//! A process group is the unit of deployment that maps 1:1 to a live
//! process. Its removal flag and conditions only change through the
//! methods below: removal is append-only and conditions are observed
//! once and cleared explicitly.

use crate::ids::{ProcessClass, ProcessGroupId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure conditions tracked per process group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProcessGroupConditionType {
    /// The sidecar serving configuration to the process cannot be reached.
    SidecarUnreachable,
    /// The process has not picked up the current dynamic configuration.
    IncorrectConfigMap,
    /// The process has not been scheduled yet.
    PodPending,
}

impl fmt::Display for ProcessGroupConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A condition together with the time it was first observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessGroupCondition {
    pub condition: ProcessGroupConditionType,
    pub observed_at: DateTime<Utc>,
}

/// Status of a single process group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessGroupStatus {
    /// Unique id, e.g. `storage-4`
    pub process_group_id: ProcessGroupId,

    /// Class of the processes in this group
    pub process_class: ProcessClass,

    /// Last known fault domain (zone) of the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    removal_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<ProcessGroupCondition>,
}

impl ProcessGroupStatus {
    pub fn new(process_group_id: ProcessGroupId, process_class: ProcessClass) -> Self {
        Self {
            process_group_id,
            process_class,
            fault_domain: None,
            removal_timestamp: None,
            conditions: Vec::new(),
        }
    }

    pub fn with_fault_domain(mut self, fault_domain: impl Into<String>) -> Self {
        self.fault_domain = Some(fault_domain.into());
        self
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.removal_timestamp.is_some()
    }

    pub fn removal_timestamp(&self) -> Option<DateTime<Utc>> {
        self.removal_timestamp
    }

    /// Flag the group for removal. Returns `true` if the flag was newly set;
    /// an existing flag and its timestamp are left untouched.
    pub fn mark_for_removal(&mut self, now: DateTime<Utc>) -> bool {
        if self.removal_timestamp.is_some() {
            return false;
        }
        self.removal_timestamp = Some(now);
        true
    }

    pub fn conditions(&self) -> &[ProcessGroupCondition] {
        &self.conditions
    }

    /// Time the condition was first observed, if it is currently set.
    pub fn condition_time(&self, condition: ProcessGroupConditionType) -> Option<DateTime<Utc>> {
        self.conditions
            .iter()
            .find(|c| c.condition == condition)
            .map(|c| c.observed_at)
    }

    pub fn has_condition(&self, condition: ProcessGroupConditionType) -> bool {
        self.condition_time(condition).is_some()
    }

    /// Record a condition. Returns `true` if it was newly set; the first
    /// observation time wins.
    pub fn observe_condition(
        &mut self,
        condition: ProcessGroupConditionType,
        now: DateTime<Utc>,
    ) -> bool {
        if self.has_condition(condition) {
            return false;
        }
        self.conditions.push(ProcessGroupCondition {
            condition,
            observed_at: now,
        });
        true
    }

    /// Clear a condition. Returns `true` if it was present.
    pub fn clear_condition(&mut self, condition: ProcessGroupConditionType) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.condition != condition);
        self.conditions.len() != before
    }
}

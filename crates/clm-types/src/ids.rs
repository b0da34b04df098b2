//! Strongly-typed identifiers for CLM entities
//!
//! Process group ids encode their class and ordinal (`storage-4`,
//! `cluster_controller-1`) and are wrapped in a newtype for type safety.

use crate::error::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The role a process group plays in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessClass {
    Storage,
    Log,
    Transaction,
    Stateless,
    ClusterController,
}

impl ProcessClass {
    pub const ALL: [ProcessClass; 5] = [
        ProcessClass::Storage,
        ProcessClass::Log,
        ProcessClass::Transaction,
        ProcessClass::Stateless,
        ProcessClass::ClusterController,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessClass::Storage => "storage",
            ProcessClass::Log => "log",
            ProcessClass::Transaction => "transaction",
            ProcessClass::Stateless => "stateless",
            ProcessClass::ClusterController => "cluster_controller",
        }
    }

    /// Whether more than one server may be multiplexed into a single unit.
    pub fn supports_density(&self) -> bool {
        matches!(self, ProcessClass::Storage)
    }
}

impl fmt::Display for ProcessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessClass {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessClass::ALL
            .iter()
            .copied()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| TypesError::UnknownProcessClass(s.to_string()))
    }
}

/// Unique identifier for a process group
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessGroupId(String);

impl ProcessGroupId {
    /// Build the canonical id for a class and ordinal.
    pub fn new(class: ProcessClass, ordinal: u64) -> Self {
        Self(format!("{}-{}", class, ordinal))
    }

    /// Parse an id, requiring a `<class>-<ordinal>` shape.
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        let id = Self(s.to_string());
        match (id.class(), id.ordinal()) {
            (Some(_), Some(_)) => Ok(id),
            _ => Err(TypesError::InvalidProcessGroupId(s.to_string())),
        }
    }

    /// Wrap an arbitrary string without validation.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric suffix after the last `-`, if any.
    pub fn ordinal(&self) -> Option<u64> {
        self.0
            .rsplit_once('-')
            .and_then(|(_, suffix)| suffix.parse().ok())
    }

    /// Class encoded in the id. Tolerates a cluster-specific prefix
    /// (`mycluster-storage-4`).
    pub fn class(&self) -> Option<ProcessClass> {
        let (head, _) = self.0.rsplit_once('-')?;
        ProcessClass::ALL
            .iter()
            .copied()
            .find(|class| head == class.as_str() || head.ends_with(&format!("-{}", class)))
    }
}

impl fmt::Display for ProcessGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProcessGroupId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Namespaced key of a cluster object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterKey {
    pub namespace: String,
    pub name: String,
}

impl ClusterKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

//! Live process records
//!
//! A `LiveProcess` is the controller's view of the deployed unit backing a
//! process group. Bookkeeping is kept as string metadata on the unit so it
//! survives controller restarts.

use crate::error::TypesError;
use crate::ids::ProcessGroupId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Well-known metadata keys
pub mod keys {
    /// Fingerprint of the configuration last applied to the unit.
    pub const LAST_APPLIED_CONFIG: &str = "clm.io/last-applied-config";
    /// Unix seconds of the latest failed attempt to apply configuration.
    pub const OUTDATED_CONFIG_SINCE: &str = "clm.io/outdated-config-since";
    pub const PROCESS_CLASS: &str = "clm.io/process-class";
    pub const IMAGE_TYPE: &str = "clm.io/image-type";
    pub const STORAGE_SERVERS_PER_POD: &str = "clm.io/storage-servers-per-pod";
}

/// How the server binaries are packaged in the unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// Server and config sidecar run from separate images.
    #[default]
    Split,
    /// A single image runs the server and serves configuration itself.
    Unified,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Split => "split",
            ImageType::Unified => "unified",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "split" => Ok(ImageType::Split),
            "unified" => Ok(ImageType::Unified),
            other => Err(TypesError::UnknownImageType(other.to_string())),
        }
    }
}

/// Lifecycle phase of the unit as reported by the process manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LivePhase {
    Pending,
    #[default]
    Running,
    Terminating,
}

/// A deployed unit backing a process group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveProcess {
    pub process_group_id: ProcessGroupId,

    #[serde(default)]
    pub phase: LivePhase,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LiveProcess {
    pub fn new(process_group_id: ProcessGroupId) -> Self {
        Self {
            process_group_id,
            phase: LivePhase::Running,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn last_applied_fingerprint(&self) -> Option<&str> {
        self.metadata_value(keys::LAST_APPLIED_CONFIG)
    }

    pub fn set_last_applied_fingerprint(&mut self, fingerprint: impl Into<String>) {
        self.metadata
            .insert(keys::LAST_APPLIED_CONFIG.to_string(), fingerprint.into());
    }

    /// Time of the latest failed apply, if recorded and well formed.
    pub fn outdated_since(&self) -> Option<DateTime<Utc>> {
        self.metadata_value(keys::OUTDATED_CONFIG_SINCE)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn mark_outdated(&mut self, now: DateTime<Utc>) {
        self.metadata.insert(
            keys::OUTDATED_CONFIG_SINCE.to_string(),
            now.timestamp().to_string(),
        );
    }

    /// Returns `true` if an outdated marker was present.
    pub fn clear_outdated(&mut self) -> bool {
        self.metadata.remove(keys::OUTDATED_CONFIG_SINCE).is_some()
    }
}

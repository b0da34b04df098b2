//! Dynamic configuration content distributed to live processes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shared entry holding the cluster connection string.
pub const CLUSTER_FILE_KEY: &str = "cluster-file";
/// Optional shared entry with trusted CA certificates.
pub const CA_FILE_KEY: &str = "ca-file";

/// Key/value configuration content, ordered for stable hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicConfig(BTreeMap<String, String>);

impl DynamicConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

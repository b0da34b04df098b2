//! Config drift detection
//!
//! A [`Fingerprint`] is a BLAKE3 digest over the configuration entries a
//! process actually consumes plus its class, image type and server count.
//! Comparing it with the fingerprint a process last applied tells whether
//! the process has drifted, without shipping the content around.

use crate::error::ConfigError;
use clm_types::config::{CA_FILE_KEY, CLUSTER_FILE_KEY};
use clm_types::live::keys;
use clm_types::{DynamicConfig, ImageType, LiveProcess, ProcessClass};
use std::fmt;

/// Content-addressed identity of a process's effective configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs resolved from a live process's metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessParameters {
    pub process_class: ProcessClass,
    pub image_type: ImageType,
    pub servers_per_pod: u32,
}

/// Read class, image type and server count off the unit's metadata.
pub fn resolve_parameters(process: &LiveProcess) -> Result<ProcessParameters, ConfigError> {
    let id = &process.process_group_id;

    let servers_per_pod = match process.metadata_value(keys::STORAGE_SERVERS_PER_POD) {
        None => 1,
        Some(raw) => match raw.parse::<u32>() {
            Ok(0) => {
                return Err(ConfigError::MalformedMetadata {
                    process_group_id: id.clone(),
                    key: keys::STORAGE_SERVERS_PER_POD,
                    value: raw.to_string(),
                    reason: "must be at least 1".to_string(),
                })
            }
            Ok(count) => count,
            Err(err) => {
                return Err(ConfigError::MalformedMetadata {
                    process_group_id: id.clone(),
                    key: keys::STORAGE_SERVERS_PER_POD,
                    value: raw.to_string(),
                    reason: err.to_string(),
                })
            }
        },
    };

    let raw_class =
        process
            .metadata_value(keys::PROCESS_CLASS)
            .ok_or_else(|| ConfigError::MissingMetadata {
                process_group_id: id.clone(),
                key: keys::PROCESS_CLASS,
            })?;
    let process_class =
        raw_class
            .parse::<ProcessClass>()
            .map_err(|err| ConfigError::MalformedMetadata {
                process_group_id: id.clone(),
                key: keys::PROCESS_CLASS,
                value: raw_class.to_string(),
                reason: err.to_string(),
            })?;

    let image_type = match process.metadata_value(keys::IMAGE_TYPE) {
        None => ImageType::default(),
        Some(raw) => raw
            .parse::<ImageType>()
            .map_err(|err| ConfigError::MalformedMetadata {
                process_group_id: id.clone(),
                key: keys::IMAGE_TYPE,
                value: raw.to_string(),
                reason: err.to_string(),
            })?,
    };

    Ok(ProcessParameters {
        process_class,
        image_type,
        servers_per_pod,
    })
}

/// Entry holding the monitor configuration for a class.
pub fn class_config_key(process_class: ProcessClass, servers_per_pod: u32) -> String {
    if process_class.supports_density() && servers_per_pod > 1 {
        format!(
            "monitor-conf-{}-density-{}",
            process_class, servers_per_pod
        )
    } else {
        format!("monitor-conf-{}", process_class)
    }
}

/// Fingerprint the configuration a process of this shape consumes.
pub fn compute(
    config: &DynamicConfig,
    process_class: ProcessClass,
    image_type: ImageType,
    servers_per_pod: u32,
) -> Result<Fingerprint, ConfigError> {
    let class_key = class_config_key(process_class, servers_per_pod);
    let class_conf = config
        .get(&class_key)
        .ok_or_else(|| ConfigError::MissingEntry(class_key.clone()))?;
    let cluster_file = config
        .get(CLUSTER_FILE_KEY)
        .ok_or_else(|| ConfigError::MissingEntry(CLUSTER_FILE_KEY.to_string()))?;

    let mut hasher = blake3::Hasher::new();
    frame(&mut hasher, process_class.as_str().as_bytes());
    frame(&mut hasher, image_type.as_str().as_bytes());
    frame(&mut hasher, &servers_per_pod.to_le_bytes());
    frame(&mut hasher, CLUSTER_FILE_KEY.as_bytes());
    frame(&mut hasher, cluster_file.as_bytes());
    if let Some(ca_file) = config.get(CA_FILE_KEY) {
        frame(&mut hasher, CA_FILE_KEY.as_bytes());
        frame(&mut hasher, ca_file.as_bytes());
    }
    frame(&mut hasher, class_key.as_bytes());
    frame(&mut hasher, class_conf.as_bytes());

    Ok(Fingerprint(hasher.finalize().to_hex().to_string()))
}

/// Resolve the process's parameters and fingerprint its configuration.
pub fn for_process(config: &DynamicConfig, process: &LiveProcess) -> Result<Fingerprint, ConfigError> {
    let params = resolve_parameters(process)?;
    compute(
        config,
        params.process_class,
        params.image_type,
        params.servers_per_pod,
    )
}

// Length prefix keeps adjacent fields from bleeding into each other.
fn frame(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

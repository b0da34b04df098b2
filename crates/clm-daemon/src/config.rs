//! Configuration for clm-daemon

use crate::error::DaemonResult;
use clm_reconcile::ReconcilerConfig;
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Subreconciler and scheduler timing
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Layer defaults, an optional file and `CLM_` environment variables.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `CLM_RECONCILER__RESYNC_INTERVAL_SECS=30`.
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CLM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}

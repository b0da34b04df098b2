//! CLM Daemon - Background reconciliation service
//!
//! The CLM daemon provides:
//! - Removal selection for clusters with surplus process groups
//! - Configuration convergence for live processes
//! - A reconciliation loop per cluster with backoff and resync

use clap::Parser;
use clm_daemon::{shutdown_signal, Daemon, DaemonConfig, DaemonResult, Manifest};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLM Daemon CLI
#[derive(Parser)]
#[command(name = "clmd")]
#[command(about = "CLM Daemon - Background reconciliation service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CLM_CONFIG")]
    config: Option<String>,

    /// Cluster manifest (JSON)
    #[arg(short, long, env = "CLM_MANIFEST")]
    manifest: Option<String>,

    /// Log level
    #[arg(long, env = "CLM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CLM_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let manifest = match cli.manifest.as_deref() {
        Some(path) => Manifest::load(path)?,
        None => {
            tracing::warn!("No cluster manifest given, nothing to reconcile");
            Manifest::default()
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        clusters = manifest.clusters.len(),
        "Starting CLM daemon"
    );

    Daemon::new(config, &manifest).run(shutdown_signal()).await
}

//! rscrm preflight binary
//!
//! Loads the configuration, installs logging and metrics, connects the
//! configured storage backend and reports its health. Deployments run it
//! before starting the web tier.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! rscrm --config rscrm.yaml
//!
//! # With environment variables only
//! RSCRM_STORAGE__BACKEND=memory rscrm --print-metrics
//! ```

use clap::Parser;
use tracing::{error, info};

use rscrm_server::observability::{init_logging, init_metrics, LoggingConfig};
use rscrm_server::{AuthorizationService, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "rscrm")]
#[command(version, about = "Checks rscrm configuration and storage", long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Print the Prometheus exposition after the check
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config.as_deref() {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(LoggingConfig::from_settings(&config.logging));
    let metrics = init_metrics()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %config.storage.backend,
        default_scope = %config.authorization.default_scope,
        "Starting rscrm preflight"
    );

    let service = AuthorizationService::from_config(&config).await?;
    let status = service.health_check().await?;

    if status.healthy {
        info!(latency_ms = status.latency.as_millis() as u64, "Storage healthy");
    } else {
        error!(message = ?status.message, "Storage unhealthy");
    }

    if args.print_metrics {
        println!("{}", metrics.render());
    }

    if !status.healthy {
        anyhow::bail!("storage backend '{}' is unhealthy", config.storage.backend);
    }
    Ok(())
}

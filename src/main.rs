//! Web proxy binary.
//!
//! Loads the TOML config, installs logging and metrics, then serves until
//! SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use web_proxy::config::{load_config, validate_log_level};
use web_proxy::lifecycle::signals::trigger_on_signal;
use web_proxy::lifecycle::Shutdown;
use web_proxy::observability::logging::{init_logging, LogFormat};
use web_proxy::observability::metrics::init_metrics;
use web_proxy::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "web-proxy")]
#[command(about = "Load-balancing reverse proxy with abuse filtering and response caching")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/proxy.toml")]
    config: PathBuf,

    /// Override `observability.log_level` from the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(level) = args.log_level {
        validate_log_level(&level)?;
        config.observability.log_level = level;
    }

    init_logging(
        &config.observability.log_level,
        LogFormat::parse(&config.observability.log_format),
    );

    if args.validate_config {
        tracing::info!(path = %args.config.display(), "Configuration is valid");
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        backends = config.backends.len(),
        "web-proxy starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    error = %e,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(trigger_on_signal(shutdown.clone()));

    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

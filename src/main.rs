//! TSDB write relay.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                      RELAY                           │
//!   POST /write           │  ┌─────────┐   ┌────────┐   ┌────────────┐           │
//!   ──────────────────────┼─▶│  http   │──▶│ router │──▶│ dispatcher │──┬────────┼──▶ Backend A
//!                         │  │listener │   │ (rules)│   │ (fan-out)  │  ├────────┼──▶ Backend B
//!                         │  └─────────┘   └────────┘   └─────┬──────┘  └────────┼──▶ Backend C
//!                         │                                   │ unavailable      │
//!                         │                                   ▼                  │
//!                         │  ┌────────────┐  transitions ┌──────────────┐         │
//!                         │  │  health    │─────────────▶│ retry buffer │         │
//!                         │  │  tracker   │              │  + drainers  │─────────┼──▶ replay
//!                         │  └────────────┘              └──────────────┘         │
//!                         │   ▲ probes                                            │
//!                         │  ┌────────────────────────────────────────────────┐   │
//!                         │  │ config (toml, reload) · observability · admin  │   │
//!                         │  └────────────────────────────────────────────────┘   │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use tsdb_relay::config::loader::load_config;
use tsdb_relay::config::watcher::ConfigWatcher;
use tsdb_relay::lifecycle::shutdown_signal;
use tsdb_relay::observability::{logging, metrics};
use tsdb_relay::{HttpServer, Relay};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to a file in this directory instead of stdout
    #[arg(long, env = "TSDB_RELAY_LOGDIR")]
    logdir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Configuration problems are fatal at startup, before anything else runs.
    let mut config = load_config(&args.config)?;
    if let Some(dir) = args.logdir {
        config.observability.log_dir = Some(dir);
    }
    logging::init(&config.observability, args.verbose)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "tsdb-relay starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let relay = Arc::new(Relay::new(config.clone())?);
    relay.start();

    // Hot reload; the watcher handle must stay alive for the process lifetime.
    let (watcher, mut updates) = ConfigWatcher::new(&args.config);
    let _watcher = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };
    {
        let relay = relay.clone();
        tokio::spawn(async move {
            while let Some(new_config) = updates.recv().await {
                if let Err(e) = relay.reload(new_config) {
                    tracing::error!(error = %e, "Failed to apply configuration, keeping current");
                }
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        backends = config.backends.len(),
        "Listening for writes"
    );

    let server = HttpServer::new(relay.clone(), &config);
    server.run(listener, shutdown_signal()).await?;

    relay.stop().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

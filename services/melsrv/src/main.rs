//! melsrv - MELSEC-Q/L polling service

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use common::logging::LogConfig;
use tracing::{error, info, warn};

use melsrv::config::ServiceConfig;
use melsrv::runtime::{spawn_poller, Poller};
use melsrv::{SERVICE_NAME, SERVICE_VERSION};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/melsrv.yaml")]
    config: PathBuf,

    /// Log filter directive, overrides the configured level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Disable colored console output
    #[arg(long)]
    no_color: bool,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ServiceConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    common::logging::init_with_config(LogConfig {
        service_name: config.service.name.clone(),
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.service.log_level.clone()),
        log_dir: config.service.log_dir.clone(),
        ansi: !args.no_color,
    })
    .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    if args.validate {
        info!(
            "Configuration {} is valid: {} connection(s)",
            args.config.display(),
            config.connections.len()
        );
        return Ok(());
    }

    info!("Starting {} v{}", SERVICE_NAME, SERVICE_VERSION);

    let shutdown = common::shutdown::shutdown_token();
    let mut handles = Vec::with_capacity(config.connections.len());
    for connection in &config.connections {
        let poller = Poller::new(
            connection.poller_settings()?,
            connection.connector()?,
            connection.writer(),
        )?;
        handles.push(spawn_poller(poller, shutdown.child_token()));
    }
    info!("{} poller(s) running", handles.len());

    shutdown.cancelled().await;
    info!("Stopping {} poller(s)", handles.len());

    let mut failed = 0usize;
    for handle in handles {
        let source = handle.source().to_string();
        let status = handle.status();
        match handle.shutdown().await {
            Ok(()) => info!(
                "{}: {} poll(s), {} file(s), {} disconnect(s)",
                source, status.polls, status.files_written, status.disconnect_count
            ),
            Err(e) => {
                error!("{}: {}", source, e);
                failed += 1;
            },
        }
    }

    if failed > 0 {
        warn!("{} poller(s) ended with errors", failed);
        return Err(anyhow!("{} poller(s) ended with errors", failed));
    }
    info!("{} stopped", SERVICE_NAME);
    Ok(())
}

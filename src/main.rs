//! Periscope binary entry point.
//!
//! Resolves host targets, optionally bootstraps credentials, and spawns
//! one collection worker per host. Core functionality is provided by the
//! `periscope` library crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use periscope::{
    bootstrap,
    config::{parse_duration, AppConfig, CollectorsConfig},
    scheduler::WorkerMode,
    target::{ResolveContext, TargetSpec},
    CollectionEngine, HostWorker, SnapshotStore, SshConnector,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Periscope - remote fleet stats collection over SSH.
#[derive(Parser, Debug)]
#[command(name = "periscope", version, about, long_about = None)]
struct Cli {
    /// Hosts to monitor, as [user@]host[:port]
    #[arg(required = true)]
    hosts: Vec<String>,

    /// PEM-encoded private key file to authenticate with
    #[arg(short = 'i', long = "identity")]
    identity: Option<PathBuf>,

    /// Collection interval for continuous mode (overrides config file)
    #[arg(short = 't', long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Collect a single named snapshot instead of a continuous series
    #[arg(short = 'n', long = "name", value_parser = parse_label)]
    named_collection: Option<String>,

    /// Path to the collectors YAML file (overrides config file)
    #[arg(short = 'f', long = "collectors", env = "PERISCOPE_COLLECTORS")]
    collectors_file: Option<String>,

    /// Path to the application configuration file
    #[arg(long, env = "PERISCOPE_CONFIG")]
    config: Option<String>,

    /// Base directory for snapshot output (overrides config file)
    #[arg(long, env = "PERISCOPE_OUTPUT_DIR")]
    output_dir: Option<String>,

    /// Provision the bootstrap key on each host before collecting
    #[arg(short = 'b', long)]
    bootstrap: bool,

    /// Provision the bootstrap key, then exit without collecting
    #[arg(short = 'B', long)]
    bootstrap_only: bool,
}

/// Snapshot labels become file names; keep them to a single path segment.
fn parse_label(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("label cannot be empty".to_string());
    }
    if s.contains('/') || s.contains('\\') {
        return Err("label cannot contain path separators".to_string());
    }
    Ok(s.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,periscope=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration, then apply CLI/env overrides (CLI > ENV > file).
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };
    if let Some(interval) = cli.interval {
        config.interval = interval;
    }
    if let Some(ref file) = cli.collectors_file {
        config.collectors_file = Some(file.clone());
    }
    if let Some(ref dir) = cli.output_dir {
        config.output_dir = dir.clone();
    }
    config.validate()?;

    let registry = match &config.collectors_file {
        Some(path) => {
            tracing::info!("Loading collectors from: {}", path);
            CollectorsConfig::load(path)?.into_registry()
        }
        None => CollectorsConfig::default().into_registry(),
    };
    tracing::info!("Registered {} collector(s)", registry.len());

    // Resolve host arguments against ~/.ssh/config and OS defaults.
    let ctx = ResolveContext::from_env();
    let mut targets = Vec::with_capacity(cli.hosts.len());
    for host in &cli.hosts {
        let spec: TargetSpec = host.parse()?;
        targets.push(spec.resolve(cli.identity.as_deref(), &ctx));
    }

    let connector = Arc::new(SshConnector::new());

    if cli.bootstrap || cli.bootstrap_only {
        let key = bootstrap::ensure_keypair(Path::new("."))?;
        for target in &mut targets {
            if let Err(e) = bootstrap::authorize(&*connector, target, &key.public_key_line).await {
                tracing::error!(host = %target.host, error = %e, "Bootstrap failed");
                continue;
            }
            target.identity_file = Some(key.private_key_path.clone());
        }
        if cli.bootstrap_only {
            return Ok(());
        }
    }

    let engine = CollectionEngine::new(config.command_timeout);
    let store = Arc::new(SnapshotStore::new(&config.output_dir));
    let cancel = CancellationToken::new();

    let mode = match &cli.named_collection {
        Some(label) => WorkerMode::OneShot {
            label: label.clone(),
        },
        None => WorkerMode::Continuous {
            interval: config.interval,
        },
    };

    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        tracing::info!(host = %target.host, user = %target.user, "Starting worker");
        let worker = HostWorker::new(
            Arc::clone(&connector),
            target,
            Arc::clone(&registry),
            engine.clone(),
            Arc::clone(&store),
            config.retry.clone(),
            cancel.clone(),
        );
        handles.push(tokio::spawn(worker.run(mode.clone())));
    }

    if cli.named_collection.is_none() {
        // Continuous workers only end on cancellation.
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, stopping workers");
        cancel.cancel();
    }

    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_flag_parses_human_durations() {
        let cli = Cli::parse_from(["periscope", "-t", "1m30s", "db1"]);
        assert_eq!(cli.interval, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_interval_flag_rejects_empty_value() {
        assert!(Cli::try_parse_from(["periscope", "-t", "", "db1"]).is_err());
    }

    #[test]
    fn test_label_rejects_path_separators() {
        assert!(parse_label("baseline").is_ok());
        assert!(parse_label("../escape").is_err());
        assert!(parse_label("").is_err());
    }
}

//! # Check-in Terminal
//!
//! Runs one event check-in station: loads the roster, validates decoded
//! badges from stdin (or `--input`), and syncs accepted check-ins to the
//! roster authority whenever it is reachable.

use std::sync::Arc;

use anyhow::Context;
use checkin_core::{HttpRosterAuthority, StateStore};
use checkin_terminal::{CliOverrides, TerminalConfig, TerminalRuntime, input};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "checkin-terminal")]
#[command(about = "Offline-tolerant event check-in terminal")]
struct Cli {
    #[command(flatten)]
    overrides: CliOverrides,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, env_file_loaded) =
        TerminalConfig::load(&cli.overrides).context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "info,checkin_core=info,reqwest=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = config.config_path.as_ref() {
        info!(path = %path.display(), "configuration file loaded");
    }
    info!(
        api = %config.api_base_url,
        state_dir = %config.state_dir.display(),
        sweep_interval = ?config.sweep_interval,
        "starting check-in terminal"
    );

    let store = StateStore::open(&config.state_dir)
        .with_context(|| format!("failed to open state directory {}", config.state_dir.display()))?;
    let authority = HttpRosterAuthority::new(config.endpoints())
        .context("failed to build roster authority client")?;

    let lines = match config.input.as_ref() {
        Some(path) => input::open_file(path)
            .await
            .with_context(|| format!("failed to open input file {}", path.display()))?,
        None => input::stdin(),
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => shutdown.cancel(),
                Err(err) => warn!(error = %err, "failed to listen for ctrl-c"),
            }
        });
    }

    let runtime = TerminalRuntime::new(&config, store, Arc::new(authority), std::io::stdout());
    let summary = runtime.run(lines, shutdown).await?;

    if summary.pending.is_empty() {
        info!(checked_in = summary.stats.checked_in, "all check-ins synced");
    } else {
        warn!(
            pending = summary.pending.len(),
            "exiting with unsynced check-ins; they will be retried on next start"
        );
    }
    Ok(())
}

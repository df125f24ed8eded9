//! Sluice - stream JSON lines into ClickHouse
//!
//! # Usage
//!
//! ```bash
//! tail -F app.log.json | sluice --config configs/output.toml
//! sluice -c configs/output.toml --log-level debug < events.jsonl
//! ```
//!
//! Each input line must be one JSON object. Reading stops at end of input or
//! on SIGINT/SIGTERM, after which buffered records are drained.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sluice_sinks::clickhouse::{ClickHouseOutput, ClickHouseOutputConfig, record_from_json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Sluice - batched, replica-aware ClickHouse writer
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to output configuration file
    #[arg(short, long, default_value = "configs/output.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let text = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("failed to read {}", cli.config.display()))?;
    let config: ClickHouseOutputConfig = text.parse().context("failed to load configuration")?;

    let output = ClickHouseOutput::connect(config)
        .await
        .context("failed to start clickhouse output")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let mut line_number: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    line_number += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record = serde_json::from_str(&line).ok().and_then(record_from_json);
                    match record {
                        Some(record) => output.submit(record).await,
                        None => tracing::warn!(
                            line = line_number,
                            "skipping line that is not a JSON object"
                        ),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read input");
                    break;
                }
            },
        }
    }

    let snapshot = output.shutdown().await;
    tracing::info!(
        lines = line_number,
        rows_written = snapshot.rows_written,
        batches_failed = snapshot.batches_failed,
        "done"
    );
    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! healthgrid-replay — run recorded health events through an aggregator.
//!
//! Reads a JSON-lines file of health events (add/remove check, purge,
//! status changed), feeds them in order to a live aggregator, and prints
//! every instance health transition to stdout as one JSON object per line.
//!
//! # Usage
//!
//! ```text
//! healthgrid-replay --input events.jsonl --config aggregator.toml
//! ```

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::info;

use healthgrid_aggregator::HealthAggregator;
use healthgrid_core::{AggregatorConfig, HealthEvent, InstanceHealthChanged};

#[derive(Parser)]
#[command(name = "healthgrid-replay", about = "Replay health events through an aggregator")]
struct Cli {
    /// JSON-lines file of health events.
    #[arg(long)]
    input: PathBuf,

    /// Aggregator config (TOML). Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match &cli.config {
        Some(path) => AggregatorConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AggregatorConfig::default(),
    };

    let events = read_events(&cli.input)?;
    info!(events = events.len(), input = ?cli.input, "replaying health events");

    let (printed, _) = replay(&config, events, BufWriter::new(std::io::stdout())).await?;
    info!(transitions = printed, "all transitions written");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,healthgrid=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Feed `events` through a fresh aggregator, writing every transition to
/// `out` as a JSON line. Returns the number of transitions and the writer.
async fn replay<W>(
    config: &AggregatorConfig,
    events: Vec<HealthEvent>,
    out: W,
) -> anyhow::Result<(usize, W)>
where
    W: Write + Send + 'static,
{
    // Unbounded so a slow writer never costs a transition.
    let (transitions_tx, transitions) = mpsc::unbounded_channel();
    let notifier = move |event: InstanceHealthChanged| {
        let _ = transitions_tx.send(event);
    };
    let printer = tokio::spawn(write_transitions(transitions, out));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (handle, task) = HealthAggregator::spawn(config, Arc::new(notifier), shutdown_rx);

    for event in events {
        handle.send(event).await?;
    }

    let stats = handle.stats().await?;
    info!(stats = %serde_json::to_string(&stats)?, "replay finished");

    let _ = shutdown_tx.send(true);
    task.await.context("aggregator task failed")?;
    printer.await.context("printer task failed")?
}

/// Write each transition as a JSON line until the aggregator drops its
/// notifier.
async fn write_transitions<W: Write>(
    mut transitions: mpsc::UnboundedReceiver<InstanceHealthChanged>,
    mut out: W,
) -> anyhow::Result<(usize, W)> {
    let mut printed = 0;
    while let Some(event) = transitions.recv().await {
        serde_json::to_writer(&mut out, &event)?;
        writeln!(out)?;
        printed += 1;
    }
    out.flush()?;
    Ok((printed, out))
}

fn read_events(path: &Path) -> anyhow::Result<Vec<HealthEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_events(&content)
}

/// Parse JSON-lines content, skipping blank lines and `#` comments.
fn parse_events(content: &str) -> anyhow::Result<Vec<HealthEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", index + 1))
        })
        .collect()
}

//! hopcount CLI
//!
//! Reads trip records as JSON lines on stdin and prints every destination whose
//! trip count in a sliding window exceeds the limit, one JSON result per line.
//!
//! ## Usage
//!
//! ```bash
//! # Destinations with more than 20 trips per 15 minute window, sliding every 5 minutes
//! hopcount < trips.jsonl
//!
//! # Custom threshold and engine file, metrics on :9090
//! hopcount --limit 50 --config engine.json --metrics-addr 0.0.0.0:9090 < trips.jsonl
//! ```

use clap::Parser;
use futures::StreamExt;
use hopcount::config::EngineConfig;
use hopcount::emit::PrintSink;
use hopcount::engine::PartitionedEngine;
use hopcount::{metrics, source};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hopcount")]
#[command(about = "Popular destinations over event-time sliding windows")]
#[command(version)]
struct Cli {
  /// Engine configuration file (JSON)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Emit destinations whose window count is strictly greater than this
  #[arg(short, long)]
  limit: Option<u64>,

  /// Number of partition workers
  #[arg(short, long)]
  partitions: Option<usize>,

  /// Serve Prometheus metrics on this address
  #[arg(long)]
  metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut config = match &cli.config {
    Some(path) => EngineConfig::from_path(path)?,
    None => EngineConfig::default(),
  };
  if let Some(limit) = cli.limit {
    config = config.with_threshold(limit);
  }
  if let Some(partitions) = cli.partitions {
    config = config.with_partition_count(partitions);
  }

  if let Some(addr) = cli.metrics_addr {
    metrics::install_prometheus_recorder_on(addr)?;
    info!(%addr, "serving metrics");
  }

  let engine = PartitionedEngine::start(config, PrintSink::stdout())?;

  let trips = source::valid_trips(BufReader::new(tokio::io::stdin()));
  futures::pin_mut!(trips);
  while let Some(trip) = trips.next().await {
    engine.submit(trip).await?;
  }

  let report = engine.shutdown().await?;
  info!(
    events = report.total_events(),
    late = report.total_late_drops(),
    fired = report.total_windows_fired(),
    emitted = report.total_results_emitted(),
    "done"
  );
  Ok(())
}

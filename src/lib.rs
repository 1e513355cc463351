//! # hopcount
//!
//! Event-time sliding-window counts with threshold filtering, in pure Rust.
//!
//! hopcount counts events per key over overlapping (hopping) windows and emits
//! every `(key, window, count)` whose count strictly exceeds a threshold. Each
//! result is emitted exactly once, when a bounded-out-of-orderness watermark
//! confirms the window is complete. The canonical use is finding popular taxi
//! destinations: trips per drop-off location over 15 minute windows sliding
//! every 5 minutes.
//!
//! ## Key Features
//!
//! - **Event Time**: windows are driven by timestamps in the data, never by the wall clock
//! - **Bounded Lateness**: the watermark trails the newest event by a fixed tolerance
//! - **Partitioned**: one tokio worker per key partition, no shared state
//! - **Exactly-Once Firing**: every `(key, window)` fires at most once
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hopcount::config::EngineConfig;
//! use hopcount::emit::PrintSink;
//! use hopcount::engine::PartitionedEngine;
//! use hopcount::event::TripEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let engine = PartitionedEngine::start(EngineConfig::default().with_threshold(2), PrintSink::stdout())?;
//! for minute in 0..4 {
//!   engine.submit(TripEvent::new("161", minute * 60_000)?).await?;
//! }
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Per-key running counts owned by one partition.
pub mod aggregate;
/// Engine configuration and its file form.
pub mod config;
/// Threshold filtering and result sinks.
pub mod emit;
/// Partitioned execution: one worker per key partition.
pub mod engine;
/// Error types.
pub mod error;
/// Trip events and result records.
pub mod event;
/// Prometheus-compatible metrics for production observability.
pub mod metrics;
/// Per-partition windowed count operator.
pub mod operator;
/// Deterministic key to partition routing.
pub mod partitioning;
/// JSON-lines trip source.
pub mod source;
/// Event-time watermarks.
pub mod watermark;
/// Sliding windows, triggers and late data policy.
pub mod window;

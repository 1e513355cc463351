//! Partitioned execution of the windowed count.
//!
//! Runs one [`WindowOperator`] per partition, each on its own tokio task fed by
//! a bounded queue. Input is routed by `fnv1a(destination) % partition_count`,
//! so every key is owned by exactly one worker and partition state needs no
//! locking.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hopcount::config::EngineConfig;
//! use hopcount::emit::VecSink;
//! use hopcount::engine::PartitionedEngine;
//! use hopcount::event::TripEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let sink = VecSink::new();
//! let engine = PartitionedEngine::start(EngineConfig::default(), sink.clone())?;
//! engine.submit(TripEvent::new("161", 1_000)?).await?;
//! let report = engine.shutdown().await?;
//! assert_eq!(report.total_events(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Shutdown
//!
//! [`PartitionedEngine::shutdown`] closes every queue. Each worker drains what
//! is already queued, fires all remaining windows at the end-of-stream
//! watermark and exits. A worker that failed or panicked is reported as
//! [`EngineError::PartitionFailed`]; it is never folded into a successful
//! report.

use crate::config::EngineConfig;
use crate::emit::{ResultSink, VecSink};
use crate::error::{EngineError, OperatorResult};
use crate::event::{LateTrip, TripEvent};
use crate::operator::WindowOperator;
pub use crate::operator::PartitionReport;
use crate::partitioning::{partition_for_key, PartitionKey};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

/// A partition worker that did not finish cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionFailure {
  /// Index of the failed partition.
  pub partition: usize,
  /// Operator error or panic message.
  pub reason: String,
}

/// Outcome of a full engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineReport {
  /// Reports of the partitions that completed, ordered by partition.
  pub partitions: Vec<PartitionReport>,
  /// Partitions that failed, ordered by partition.
  pub failures: Vec<PartitionFailure>,
}

impl EngineReport {
  /// Returns true if every partition completed.
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }

  /// Total events processed by completed partitions.
  pub fn total_events(&self) -> u64 {
    self.partitions.iter().map(|p| p.events_processed).sum()
  }

  /// Total late `(event, window)` pairs across completed partitions.
  pub fn total_late_drops(&self) -> u64 {
    self.partitions.iter().map(|p| p.late_drops).sum()
  }

  /// Total windows fired across completed partitions.
  pub fn total_windows_fired(&self) -> u64 {
    self.partitions.iter().map(|p| p.windows_fired).sum()
  }

  /// Total results emitted across completed partitions.
  pub fn total_results_emitted(&self) -> u64 {
    self.partitions.iter().map(|p| p.results_emitted).sum()
  }

  /// Converts a report with failures into the first failure.
  pub fn into_result(self) -> Result<Self, EngineError> {
    match self.failures.first() {
      Some(failure) => Err(EngineError::PartitionFailed {
        partition: failure.partition,
        reason: failure.reason.clone(),
      }),
      None => Ok(self),
    }
  }
}

/// Runs one windowed count operator per partition.
#[derive(Debug)]
pub struct PartitionedEngine {
  config: EngineConfig,
  senders: Vec<mpsc::Sender<TripEvent>>,
  workers: Vec<JoinHandle<OperatorResult<PartitionReport>>>,
}

impl PartitionedEngine {
  /// Validates `config` and spawns one worker per partition.
  ///
  /// Must be called from within a tokio runtime. Every worker gets its own
  /// clone of `sink`.
  ///
  /// # Errors
  ///
  /// Returns [`EngineError::Config`] if the configuration is invalid.
  pub fn start<S>(config: EngineConfig, sink: S) -> Result<Self, EngineError>
  where
    S: ResultSink + Clone + 'static,
  {
    Self::spawn(config, sink, None::<VecSink<LateTrip>>)
  }

  /// Like [`start`](Self::start), with a side output for late events.
  ///
  /// The side output only receives records when the configured policy is
  /// [`LateDataPolicy::SideOutput`](crate::window::LateDataPolicy::SideOutput).
  pub fn start_with_late_sink<S, L>(
    config: EngineConfig,
    sink: S,
    late_sink: L,
  ) -> Result<Self, EngineError>
  where
    S: ResultSink + Clone + 'static,
    L: ResultSink<LateTrip> + Clone + 'static,
  {
    Self::spawn(config, sink, Some(late_sink))
  }

  fn spawn<S, L>(config: EngineConfig, sink: S, late_sink: Option<L>) -> Result<Self, EngineError>
  where
    S: ResultSink + Clone + 'static,
    L: ResultSink<LateTrip> + Clone + 'static,
  {
    config.validate()?;

    let mut senders = Vec::with_capacity(config.partition_count);
    let mut workers = Vec::with_capacity(config.partition_count);

    for partition in 0..config.partition_count {
      let mut operator = WindowOperator::new(partition, &config, sink.clone())?;
      if let Some(late) = &late_sink {
        operator = operator.with_late_sink(late.clone());
      }
      let (tx, rx) = mpsc::channel(config.queue_capacity);
      senders.push(tx);
      workers.push(tokio::spawn(partition_worker(operator, rx)));
    }

    info!(
      partitions = config.partition_count,
      queue_capacity = config.queue_capacity,
      threshold = config.threshold,
      "engine started"
    );

    Ok(Self {
      config,
      senders,
      workers,
    })
  }

  /// Returns the configuration the engine runs with.
  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Returns the number of partitions.
  pub fn partition_count(&self) -> usize {
    self.senders.len()
  }

  /// Returns the partition owning `key`.
  pub fn partition_for(&self, key: &PartitionKey) -> usize {
    partition_for_key(key, self.senders.len())
  }

  /// Routes an event to its partition.
  ///
  /// Waits only while the partition's queue is full.
  ///
  /// # Errors
  ///
  /// Returns [`EngineError::PartitionUnavailable`] if the owning worker has
  /// stopped. Other partitions are unaffected.
  pub async fn submit(&self, event: TripEvent) -> Result<(), EngineError> {
    let partition = self.partition_for(event.destination());
    self.senders[partition]
      .send(event)
      .await
      .map_err(|_| EngineError::PartitionUnavailable { partition })
  }

  /// Closes the queues and waits for every worker to drain and flush.
  ///
  /// # Errors
  ///
  /// Returns [`EngineError::PartitionFailed`] for the first partition that
  /// failed. Use [`shutdown_report`](Self::shutdown_report) to also see the
  /// partitions that completed.
  pub async fn shutdown(self) -> Result<EngineReport, EngineError> {
    self.shutdown_report().await.into_result()
  }

  /// Closes the queues and collects every partition's outcome.
  pub async fn shutdown_report(self) -> EngineReport {
    drop(self.senders);

    let mut report = EngineReport::default();
    for (partition, worker) in self.workers.into_iter().enumerate() {
      let outcome = match worker.await {
        Ok(Ok(partition_report)) => Ok(partition_report),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(join_failure(e)),
      };
      match outcome {
        Ok(partition_report) => report.partitions.push(partition_report),
        Err(reason) => {
          warn!(partition, reason = %reason, "partition failed");
          report.failures.push(PartitionFailure { partition, reason });
        }
      }
    }

    info!(
      completed = report.partitions.len(),
      failed = report.failures.len(),
      events = report.total_events(),
      results = report.total_results_emitted(),
      "engine shut down"
    );
    report
  }
}

async fn partition_worker<S: ResultSink>(
  mut operator: WindowOperator<S>,
  mut inbox: mpsc::Receiver<TripEvent>,
) -> OperatorResult<PartitionReport> {
  let partition = operator.partition();
  info!(partition, "partition worker started");

  while let Some(event) = inbox.recv().await {
    if let Err(e) = operator.process(event).await {
      warn!(partition, error = %e, "partition worker stopping");
      return Err(e);
    }
  }

  let report = operator.flush().await?;
  info!(
    partition,
    events = report.events_processed,
    late = report.late_drops,
    fired = report.windows_fired,
    emitted = report.results_emitted,
    "partition worker finished"
  );
  Ok(report)
}

fn join_failure(error: JoinError) -> String {
  if !error.is_panic() {
    return error.to_string();
  }
  let payload = error.into_panic();
  if let Some(message) = payload.downcast_ref::<&str>() {
    format!("panicked: {message}")
  } else if let Some(message) = payload.downcast_ref::<String>() {
    format!("panicked: {message}")
  } else {
    "panicked".to_string()
  }
}

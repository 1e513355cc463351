//! # Threshold filtering and emission
//!
//! Fired window counts pass through a [`ThresholdFilter`] and, when they qualify,
//! are appended to a [`ResultSink`]. The filter is strict: a count equal to the
//! threshold is dropped.
//!
//! Sinks are append-only and cheap to clone so that every partition worker
//! can hold its own handle:
//!
//! - [`ChannelSink`]: forwards into a bounded `tokio::sync::mpsc` channel
//! - [`VecSink`]: collects into shared memory, handy for tests and embedding
//! - [`PrintSink`]: writes one JSON document per line (stdout by default)
//!
//! The same trait carries the late-data side output, with `T = LateTrip`.

use crate::error::SinkError;
use crate::event::DestinationResult;
use crate::partitioning::PartitionKey;
use crate::window::TimeWindow;
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Append-only destination for emitted records.
#[async_trait]
pub trait ResultSink<T = DestinationResult>: Send
where
  T: Send + 'static,
{
  /// Appends one record.
  async fn emit(&mut self, item: T) -> Result<(), SinkError>;
}

/// Strict `count > threshold` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdFilter {
  threshold: u64,
}

impl ThresholdFilter {
  /// Creates a filter with the given threshold.
  pub fn new(threshold: u64) -> Self {
    Self { threshold }
  }

  /// Returns the threshold.
  pub fn threshold(&self) -> u64 {
    self.threshold
  }

  /// Returns true if `count` strictly exceeds the threshold.
  pub fn passes(&self, count: u64) -> bool {
    count > self.threshold
  }

  /// Builds a result for a qualifying count, or `None` if it is filtered out.
  pub fn handle(&self, key: PartitionKey, window: &TimeWindow, count: u64) -> Option<DestinationResult> {
    self
      .passes(count)
      .then(|| DestinationResult::new(key, window, count))
  }
}

/// Threshold filter bound to a sink.
#[derive(Debug)]
pub struct Emitter<S> {
  filter: ThresholdFilter,
  sink: S,
}

impl<S: ResultSink> Emitter<S> {
  /// Creates an emitter.
  pub fn new(filter: ThresholdFilter, sink: S) -> Self {
    Self { filter, sink }
  }

  /// Returns the filter.
  pub fn filter(&self) -> &ThresholdFilter {
    &self.filter
  }

  /// Filters a fired count and publishes it if it qualifies.
  ///
  /// Returns whether a result was emitted.
  pub async fn handle(
    &mut self,
    key: PartitionKey,
    window: &TimeWindow,
    count: u64,
  ) -> Result<bool, SinkError> {
    match self.filter.handle(key, window, count) {
      Some(result) => {
        self.sink.emit(result).await?;
        Ok(true)
      }
      None => Ok(false),
    }
  }
}

/// Sink forwarding into a bounded mpsc channel.
///
/// `emit` waits while the channel is full and fails once the receiver is gone.
#[derive(Debug)]
pub struct ChannelSink<T = DestinationResult> {
  sender: mpsc::Sender<T>,
}

impl<T> Clone for ChannelSink<T> {
  fn clone(&self) -> Self {
    Self {
      sender: self.sender.clone(),
    }
  }
}

impl<T: Send + 'static> ChannelSink<T> {
  /// Wraps an existing sender.
  pub fn new(sender: mpsc::Sender<T>) -> Self {
    Self { sender }
  }

  /// Creates a sink together with the receiving end.
  pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<T>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (Self::new(sender), receiver)
  }
}

#[async_trait]
impl<T: Send + 'static> ResultSink<T> for ChannelSink<T> {
  async fn emit(&mut self, item: T) -> Result<(), SinkError> {
    self.sender.send(item).await.map_err(|_| SinkError::Closed)
  }
}

/// Sink collecting records in shared memory.
#[derive(Debug)]
pub struct VecSink<T = DestinationResult> {
  items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for VecSink<T> {
  fn clone(&self) -> Self {
    Self {
      items: Arc::clone(&self.items),
    }
  }
}

impl<T> Default for VecSink<T> {
  fn default() -> Self {
    Self {
      items: Arc::new(Mutex::new(Vec::new())),
    }
  }
}

impl<T: Clone + Send + 'static> VecSink<T> {
  /// Creates an empty sink.
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns a snapshot of everything emitted so far.
  pub async fn items(&self) -> Vec<T> {
    self.items.lock().await.clone()
  }

  /// Removes and returns everything emitted so far.
  pub async fn take(&self) -> Vec<T> {
    std::mem::take(&mut *self.items.lock().await)
  }
}

#[async_trait]
impl<T: Send + 'static> ResultSink<T> for VecSink<T> {
  async fn emit(&mut self, item: T) -> Result<(), SinkError> {
    self.items.lock().await.push(item);
    Ok(())
  }
}

/// Sink writing each record as one line of JSON.
pub struct PrintSink {
  writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PrintSink {
  /// Prints to standard output.
  pub fn stdout() -> Self {
    Self::new(std::io::stdout())
  }

  /// Prints to any writer.
  pub fn new(writer: impl Write + Send + 'static) -> Self {
    Self {
      writer: Arc::new(Mutex::new(Box::new(writer))),
    }
  }
}

impl Clone for PrintSink {
  fn clone(&self) -> Self {
    Self {
      writer: Arc::clone(&self.writer),
    }
  }
}

impl std::fmt::Debug for PrintSink {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PrintSink").finish_non_exhaustive()
  }
}

#[async_trait]
impl<T: Serialize + Send + 'static> ResultSink<T> for PrintSink {
  async fn emit(&mut self, item: T) -> Result<(), SinkError> {
    let mut line = serde_json::to_vec(&item).map_err(|e| SinkError::Write(e.to_string()))?;
    line.push(b'\n');
    let mut writer = self.writer.lock().await;
    writer
      .write_all(&line)
      .and_then(|_| writer.flush())
      .map_err(|e| SinkError::Write(e.to_string()))
  }
}

//! # Count aggregation
//!
//! Partition-owned running counts, one per open `(key, window)` pair.
//!
//! State is ordered by window then key, so firing a watermark only has to look
//! at windows that started before it, and results come out in a stable order.

use crate::partitioning::PartitionKey;
use crate::watermark::Watermark;
use crate::window::TimeWindow;
use std::collections::BTreeMap;

/// A finalized count removed from the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCount {
  /// Key the count belongs to.
  pub key: PartitionKey,
  /// Window the count was accumulated over.
  pub window: TimeWindow,
  /// Number of events counted.
  pub count: u64,
}

/// Running counts per `(key, window)`.
///
/// Not shared: each partition worker owns exactly one aggregator.
#[derive(Debug, Default)]
pub struct CountAggregator {
  counts: BTreeMap<(TimeWindow, PartitionKey), u64>,
}

impl CountAggregator {
  /// Creates an empty aggregator.
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds one to the count for `(key, window)`, creating it at zero first.
  ///
  /// Returns the updated count.
  pub fn increment(&mut self, key: &PartitionKey, window: &TimeWindow) -> u64 {
    let count = self.counts.entry((*window, key.clone())).or_insert(0);
    *count += 1;
    *count
  }

  /// Returns the current count for `(key, window)` without removing it.
  pub fn get(&self, key: &PartitionKey, window: &TimeWindow) -> Option<u64> {
    self.counts.get(&(*window, key.clone())).copied()
  }

  /// Removes and returns the count for `(key, window)`.
  ///
  /// Returns `None` if it was never created or was already removed.
  pub fn remove(&mut self, key: &PartitionKey, window: &TimeWindow) -> Option<u64> {
    self.counts.remove(&(*window, key.clone()))
  }

  /// Lists open `(key, window)` pairs whose window started before `watermark`.
  ///
  /// Only these can be complete; the rest are skipped without inspection.
  pub fn candidates(&self, watermark: &Watermark) -> Vec<(PartitionKey, TimeWindow)> {
    self
      .counts
      .keys()
      .take_while(|(window, _)| window.start() < watermark.timestamp)
      .map(|(window, key)| (key.clone(), *window))
      .collect()
  }

  /// Removes and returns every count whose window ended at or before `watermark`.
  ///
  /// Output is ordered by window, then key.
  pub fn drain_complete(&mut self, watermark: &Watermark) -> Vec<WindowCount> {
    let complete: Vec<(TimeWindow, PartitionKey)> = self
      .counts
      .keys()
      .take_while(|(window, _)| window.start() < watermark.timestamp)
      .filter(|(window, _)| window.is_complete(watermark))
      .cloned()
      .collect();

    complete
      .into_iter()
      .filter_map(|(window, key)| {
        let count = self.counts.remove(&(window, key.clone()))?;
        Some(WindowCount { key, window, count })
      })
      .collect()
  }

  /// Number of open accumulators.
  pub fn open_accumulators(&self) -> usize {
    self.counts.len()
  }

  /// Returns true if no accumulator is open.
  pub fn is_empty(&self) -> bool {
    self.counts.is_empty()
  }
}

//! # Watermarks
//!
//! Event-time progress tracking for a single partition.
//!
//! A [`Watermark`] asserts that no more events with a timestamp at or below it
//! are expected. The [`BoundedOutOfOrdernessGenerator`] derives it from the
//! largest event time seen so far minus a fixed tolerance:
//!
//! ```text
//! watermark = max_seen_event_time - max_out_of_orderness
//! ```
//!
//! Watermarks never move backwards. Before the first event the watermark is
//! [`Watermark::min()`]; at end of stream it jumps to [`Watermark::max()`], which
//! completes every window.
//!
//! ```rust
//! use hopcount::watermark::{BoundedOutOfOrdernessGenerator, WatermarkGenerator};
//! use chrono::DateTime;
//! use std::time::Duration;
//!
//! let mut generator = BoundedOutOfOrdernessGenerator::new(Duration::from_secs(30));
//! let t = DateTime::from_timestamp_millis(60_000).unwrap();
//! let wm = generator.observe(t);
//! assert_eq!(wm.timestamp.timestamp_millis(), 30_000);
//! ```

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::time::Duration;

/// Event-time watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
  /// Timestamp below which all events are assumed to have arrived.
  pub timestamp: DateTime<Utc>,
}

impl Watermark {
  /// Creates a watermark at the given timestamp.
  pub fn new(timestamp: DateTime<Utc>) -> Self {
    Self { timestamp }
  }

  /// The initial watermark, before any event has been observed.
  pub fn min() -> Self {
    Self::new(DateTime::<Utc>::MIN_UTC)
  }

  /// The end-of-stream watermark. Every window is complete at this point.
  pub fn max() -> Self {
    Self::new(DateTime::<Utc>::MAX_UTC)
  }

  /// Returns true if this is the end-of-stream watermark.
  pub fn is_end_of_stream(&self) -> bool {
    self.timestamp == DateTime::<Utc>::MAX_UTC
  }

  /// Moves the watermark forward. Returns false (and leaves it unchanged)
  /// when `timestamp` is not newer than the current value.
  pub fn advance(&mut self, timestamp: DateTime<Utc>) -> bool {
    if timestamp > self.timestamp {
      self.timestamp = timestamp;
      true
    } else {
      false
    }
  }

  /// Watermark in epoch milliseconds, for gauges and logs.
  pub fn as_millis(&self) -> i64 {
    self.timestamp.timestamp_millis()
  }
}

impl fmt::Display for Watermark {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_end_of_stream() {
      write!(f, "Watermark(END)")
    } else if *self == Self::min() {
      write!(f, "Watermark(MIN)")
    } else {
      write!(f, "Watermark({})", self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
  }
}

/// Trait for watermark generation strategies.
pub trait WatermarkGenerator: Send + Sync + fmt::Debug {
  /// Observes an event time. Returns the new watermark if it advanced.
  fn on_event(&mut self, timestamp: DateTime<Utc>) -> Option<Watermark>;

  /// Returns the current watermark.
  fn current_watermark(&self) -> Watermark;

  /// Finalizes the stream and returns [`Watermark::max()`].
  fn on_end_of_stream(&mut self) -> Watermark;
}

/// Watermark generator tolerating a bounded amount of out-of-orderness.
#[derive(Debug, Clone)]
pub struct BoundedOutOfOrdernessGenerator {
  max_out_of_orderness: ChronoDuration,
  max_timestamp: Option<DateTime<Utc>>,
  current_watermark: Watermark,
}

impl BoundedOutOfOrdernessGenerator {
  /// Creates a generator with the given out-of-orderness tolerance.
  pub fn new(max_out_of_orderness: Duration) -> Self {
    let millis = i64::try_from(max_out_of_orderness.as_millis()).unwrap_or(i64::MAX);
    Self {
      max_out_of_orderness: ChronoDuration::milliseconds(millis),
      max_timestamp: None,
      current_watermark: Watermark::min(),
    }
  }

  /// Returns the configured tolerance.
  pub fn max_out_of_orderness(&self) -> ChronoDuration {
    self.max_out_of_orderness
  }

  /// Returns the largest event time observed so far.
  pub fn max_seen(&self) -> Option<DateTime<Utc>> {
    self.max_timestamp
  }

  /// Observes an event time and returns the (possibly unchanged) watermark.
  pub fn observe(&mut self, timestamp: DateTime<Utc>) -> Watermark {
    self.on_event(timestamp);
    self.current_watermark
  }

  fn candidate(&self, max_seen: DateTime<Utc>) -> DateTime<Utc> {
    // Saturate at the initial watermark instead of underflowing.
    max_seen
      .checked_sub_signed(self.max_out_of_orderness)
      .unwrap_or(DateTime::<Utc>::MIN_UTC)
  }
}

impl WatermarkGenerator for BoundedOutOfOrdernessGenerator {
  fn on_event(&mut self, timestamp: DateTime<Utc>) -> Option<Watermark> {
    let max_seen = match self.max_timestamp {
      Some(current) if current >= timestamp => return None,
      _ => timestamp,
    };
    self.max_timestamp = Some(max_seen);
    let candidate = self.candidate(max_seen);
    if self.current_watermark.advance(candidate) {
      Some(self.current_watermark)
    } else {
      None
    }
  }

  fn current_watermark(&self) -> Watermark {
    self.current_watermark
  }

  fn on_end_of_stream(&mut self) -> Watermark {
    self.current_watermark = Watermark::max();
    self.current_watermark
  }
}

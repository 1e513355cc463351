//! Windowing primitives for event-time sliding-window counts.
//!
//! # Overview
//!
//! A sliding (hopping) window has a fixed `size` and advances by `slide`.
//! When `slide < size` windows overlap, so one event belongs to several of
//! them. Windows are aligned to the Unix epoch (plus an optional offset), which
//! matches the `HOP(time, slide, size)` grouping of streaming SQL engines.
//!
//! # Core Concepts
//!
//! - [`TimeWindow`]: a half-open `[start, end)` interval
//! - [`WindowAssigner`]: maps an event time to the windows containing it
//! - [`WindowTrigger`]: decides when a window's data is complete
//! - [`LateDataPolicy`]: what happens to events that arrive after their window fired
//! - [`AccumulatorState`]: lifecycle of a single `(key, window)` accumulator
//!
//! # Example
//!
//! ```rust
//! use hopcount::window::{SlidingWindowAssigner, WindowAssigner};
//! use chrono::DateTime;
//! use std::time::Duration;
//!
//! let assigner =
//!   SlidingWindowAssigner::new(Duration::from_secs(15 * 60), Duration::from_secs(5 * 60)).unwrap();
//! let t = DateTime::from_timestamp_millis(7 * 60_000).unwrap();
//! assert_eq!(assigner.assign_windows(t).len(), 3);
//! ```

use crate::error::ConfigError;
use crate::watermark::Watermark;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Result of trigger evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
  /// Continue accumulating elements.
  Continue,
  /// Fire and purge (emit results and clear state).
  FireAndPurge,
}

/// Policy for handling late data (elements arriving after their window fired).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateDataPolicy {
  /// Drop late elements silently.
  #[default]
  Drop,
  /// Emit late elements to a side output.
  SideOutput,
}

/// Lifecycle of a `(key, window)` accumulator.
///
/// `Open` is the only non-terminal state. An accumulator is removed from
/// partition state as soon as it leaves `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
  /// Counting events; the watermark has not reached the window end.
  Open,
  /// The watermark reached the window end and the count was finalized.
  Fired,
  /// The event arrived after the window fired and was excluded from it.
  DiscardedLate,
}

/// A time-based window with start and end timestamps.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
  /// Start time of the window (inclusive).
  start: DateTime<Utc>,
  /// End time of the window (exclusive).
  end: DateTime<Utc>,
}

impl TimeWindow {
  /// Creates a new time window with the given start and end.
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    Self { start, end }
  }

  /// Creates a window from epoch-millisecond bounds.
  ///
  /// Returns `None` if either bound is outside the representable range.
  pub fn from_millis(start_ms: i64, end_ms: i64) -> Option<Self> {
    Some(Self::new(
      DateTime::from_timestamp_millis(start_ms)?,
      DateTime::from_timestamp_millis(end_ms)?,
    ))
  }

  /// Returns the start time of the window.
  pub fn start(&self) -> DateTime<Utc> {
    self.start
  }

  /// Returns the end time of the window.
  pub fn end(&self) -> DateTime<Utc> {
    self.end
  }

  /// Returns the duration of the window.
  pub fn duration(&self) -> ChronoDuration {
    self.end - self.start
  }

  /// Returns true if the given timestamp falls within this window.
  pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
    timestamp >= self.start && timestamp < self.end
  }

  /// Returns true once `watermark` has reached the window end.
  pub fn is_complete(&self, watermark: &Watermark) -> bool {
    watermark.timestamp >= self.end
  }
}

impl PartialEq for TimeWindow {
  fn eq(&self, other: &Self) -> bool {
    self.start == other.start && self.end == other.end
  }
}

impl Eq for TimeWindow {}

impl Hash for TimeWindow {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.start.hash(state);
    self.end.hash(state);
  }
}

impl PartialOrd for TimeWindow {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for TimeWindow {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .start
      .cmp(&other.start)
      .then_with(|| self.end.cmp(&other.end))
  }
}

impl fmt::Display for TimeWindow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "[{}, {})",
      self.start.format("%Y-%m-%dT%H:%M:%S"),
      self.end.format("%Y-%m-%dT%H:%M:%S")
    )
  }
}

/// Trait for window assigners that assign elements to windows.
pub trait WindowAssigner: Send + Sync {
  /// The window type produced by this assigner.
  type W: Clone + Debug + PartialEq + Eq + Hash + Send + Sync;

  /// Assign an element to every window containing `timestamp`.
  fn assign_windows(&self, timestamp: DateTime<Utc>) -> Vec<Self::W>;

  /// Returns the default trigger for this assigner.
  fn default_trigger(&self) -> Box<dyn WindowTrigger<Self::W>>;
}

/// Trait for window triggers that determine when to emit results.
pub trait WindowTrigger<W>: Send + Sync
where
  W: Clone + Debug + PartialEq + Eq + Hash,
{
  /// Called when an element is added to a window.
  fn on_element(&mut self, timestamp: DateTime<Utc>, window: &W) -> TriggerResult;

  /// Called when the watermark (event time) advances.
  fn on_event_time(&mut self, watermark: &Watermark, window: &W) -> TriggerResult;
}

/// Trigger that fires when the watermark reaches the window end.
#[derive(Debug, Clone, Default)]
pub struct EventTimeTrigger;

impl EventTimeTrigger {
  /// Creates a new event time trigger.
  pub fn new() -> Self {
    Self
  }
}

impl WindowTrigger<TimeWindow> for EventTimeTrigger {
  fn on_element(&mut self, _timestamp: DateTime<Utc>, _window: &TimeWindow) -> TriggerResult {
    TriggerResult::Continue
  }

  fn on_event_time(&mut self, watermark: &Watermark, window: &TimeWindow) -> TriggerResult {
    if window.is_complete(watermark) {
      TriggerResult::FireAndPurge
    } else {
      TriggerResult::Continue
    }
  }
}

/// Largest `ceil(size / slide)` a [`SlidingWindowAssigner`] accepts.
pub const MAX_WINDOWS_PER_ELEMENT: usize = 10_000;

/// Sliding window assigner that creates overlapping, epoch-aligned windows.
///
/// Each element is assigned to every window `[s, s + size)` with
/// `s ≡ offset (mod slide)` that contains it. `size` does not have to be a
/// multiple of `slide`.
#[derive(Debug, Clone)]
pub struct SlidingWindowAssigner {
  size_ms: i64,
  slide_ms: i64,
  offset_ms: i64,
}

impl SlidingWindowAssigner {
  /// Creates a new sliding window assigner.
  ///
  /// # Errors
  ///
  /// Fails if `size` or `slide` is zero, if `size + slide` does not fit in
  /// `i64` milliseconds, or if an element would fall into more than
  /// [`MAX_WINDOWS_PER_ELEMENT`] windows.
  pub fn new(size: Duration, slide: Duration) -> Result<Self, ConfigError> {
    let size_ms = duration_millis("window_size", size)?;
    let slide_ms = duration_millis("window_slide", slide)?;
    if size_ms <= 0 {
      return Err(ConfigError::NonPositiveWindowSize);
    }
    if slide_ms <= 0 {
      return Err(ConfigError::NonPositiveSlide);
    }
    if size_ms.checked_add(slide_ms).is_none() {
      return Err(ConfigError::DurationOutOfRange {
        field: "window_size",
        millis: size.as_millis(),
      });
    }
    let windows = ceil_div(size_ms, slide_ms);
    if windows > MAX_WINDOWS_PER_ELEMENT as i64 {
      return Err(ConfigError::TooManyWindowsPerElement {
        windows,
        max: MAX_WINDOWS_PER_ELEMENT,
      });
    }
    Ok(Self {
      size_ms,
      slide_ms,
      offset_ms: 0,
    })
  }

  /// Sets the offset for window alignment.
  pub fn with_offset(mut self, offset: Duration) -> Result<Self, ConfigError> {
    self.offset_ms = duration_millis("window_offset", offset)?;
    Ok(self)
  }

  /// Returns the window size.
  pub fn size(&self) -> Duration {
    Duration::from_millis(self.size_ms as u64)
  }

  /// Returns the slide interval.
  pub fn slide(&self) -> Duration {
    Duration::from_millis(self.slide_ms as u64)
  }

  /// Returns the offset.
  pub fn offset(&self) -> Duration {
    Duration::from_millis(self.offset_ms as u64)
  }

  /// Upper bound on the number of windows per element: `ceil(size / slide)`.
  pub fn windows_per_element(&self) -> usize {
    ceil_div(self.size_ms, self.slide_ms) as usize
  }

  /// Start of the latest window containing `ts_ms`.
  fn last_start(&self, ts_ms: i64) -> Option<i64> {
    let phase = ts_ms.checked_sub(self.offset_ms)?.rem_euclid(self.slide_ms);
    ts_ms.checked_sub(phase)
  }
}

impl WindowAssigner for SlidingWindowAssigner {
  type W = TimeWindow;

  fn assign_windows(&self, timestamp: DateTime<Utc>) -> Vec<Self::W> {
    let ts_millis = timestamp.timestamp_millis();
    let Some(last_start) = self.last_start(ts_millis) else {
      return Vec::new();
    };

    // Oldest first, so callers see windows in ascending start order.
    (0..self.windows_per_element() as i64)
      .rev()
      .filter_map(|i| {
        let start_millis = last_start.checked_sub(i.checked_mul(self.slide_ms)?)?;
        let end_millis = start_millis.checked_add(self.size_ms)?;
        TimeWindow::from_millis(start_millis, end_millis)
      })
      .filter(|w| w.contains(timestamp))
      .collect()
  }

  fn default_trigger(&self) -> Box<dyn WindowTrigger<Self::W>> {
    Box::new(EventTimeTrigger::new())
  }
}

fn ceil_div(a: i64, b: i64) -> i64 {
  a / b + i64::from(a % b != 0)
}

fn duration_millis(field: &'static str, duration: Duration) -> Result<i64, ConfigError> {
  let millis = duration.as_millis();
  i64::try_from(millis).map_err(|_| ConfigError::DurationOutOfRange { field, millis })
}

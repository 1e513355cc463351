//! # Error types
//!
//! Errors raised by the windowed-count core and the partitioned engine.
//!
//! The split follows the blast radius of each failure:
//!
//! - [`ConfigError`]: invalid configuration; the engine refuses to start.
//! - [`InputError`]: an event violated the input contract; fatal for that event only.
//! - [`OperatorError`]: partition state is inconsistent; fatal for that partition only.
//! - [`SinkError`]: the output channel can no longer accept results.
//! - [`EngineError`]: orchestration-level failures surfaced to the caller.
//! - [`SourceError`]: a JSON-lines record could not be turned into an event.
//!
//! Late events are deliberately absent: dropping data that arrives after its
//! window fired is a policy outcome, not a failure.

use thiserror::Error;

/// Configuration validation and loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
  /// Window size must be strictly positive.
  #[error("window size must be > 0")]
  NonPositiveWindowSize,
  /// Window slide must be strictly positive.
  #[error("window slide must be > 0")]
  NonPositiveSlide,
  /// At least one partition is required.
  #[error("partition count must be >= 1")]
  ZeroPartitions,
  /// Worker queues need room for at least one event.
  #[error("queue capacity must be >= 1")]
  ZeroQueueCapacity,
  /// A duration does not fit the millisecond range used for event time.
  #[error("{field} is out of range: {millis} ms")]
  DurationOutOfRange {
    /// Name of the offending field.
    field: &'static str,
    /// Offending value in milliseconds.
    millis: u128,
  },
  /// The size/slide ratio puts every element into too many windows.
  #[error("window size/slide yields {windows} windows per element, max is {max}")]
  TooManyWindowsPerElement {
    /// `ceil(size / slide)` of the rejected configuration.
    windows: i64,
    /// Largest accepted value.
    max: usize,
  },
  /// Config file could not be read.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  /// Config file could not be parsed.
  #[error("parse error: {0}")]
  Parse(#[from] serde_json::Error),
}

/// Input contract violations detected at the ingestion boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
  /// The destination key is absent or empty.
  #[error("trip is missing its destination key")]
  MissingKey,
  /// The pickup time is absent.
  #[error("trip is missing its event time")]
  MissingEventTime,
  /// The pickup time cannot be represented as a UTC timestamp.
  #[error("event time {0} ms is out of range")]
  EventTimeOutOfRange(i64),
}

/// Unexpected failures inside a partition's operator state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperatorError {
  /// An internal invariant of the partition state was violated.
  #[error("partition state corrupted: {0}")]
  StateCorrupted(String),
  /// The result sink rejected a result.
  #[error(transparent)]
  Sink(#[from] SinkError),
}

/// Errors produced while publishing results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
  /// The downstream channel has been closed.
  #[error("result sink closed")]
  Closed,
  /// Writing to the underlying writer failed.
  #[error("result sink write failed: {0}")]
  Write(String),
}

/// Errors surfaced by [`PartitionedEngine`](crate::engine::PartitionedEngine).
#[derive(Error, Debug)]
pub enum EngineError {
  /// The engine was configured incorrectly.
  #[error(transparent)]
  Config(#[from] ConfigError),
  /// The worker owning this partition is no longer accepting events.
  #[error("partition {partition} is unavailable")]
  PartitionUnavailable {
    /// Index of the unavailable partition.
    partition: usize,
  },
  /// A partition worker terminated abnormally.
  #[error("partition {partition} failed: {reason}")]
  PartitionFailed {
    /// Index of the failed partition.
    partition: usize,
    /// Failure description (operator error or panic message).
    reason: String,
  },
}

/// Errors produced while reading trips from a JSON-lines source.
#[derive(Error, Debug)]
pub enum SourceError {
  /// The underlying reader failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  /// A line is not a valid trip document.
  #[error("line {line}: malformed trip: {source}")]
  Malformed {
    /// 1-based line number.
    line: u64,
    /// Decoder error.
    source: serde_json::Error,
  },
  /// A line decoded but violates the input contract.
  #[error("line {line}: {source}")]
  Invalid {
    /// 1-based line number.
    line: u64,
    /// Contract violation.
    source: InputError,
  },
}

impl SourceError {
  /// Short label used for the `reason` metric label.
  pub fn reason(&self) -> &'static str {
    match self {
      SourceError::Io(_) => "io",
      SourceError::Malformed { .. } => "malformed",
      SourceError::Invalid {
        source: InputError::MissingKey,
        ..
      } => "missing_key",
      SourceError::Invalid {
        source: InputError::MissingEventTime,
        ..
      } => "missing_event_time",
      SourceError::Invalid {
        source: InputError::EventTimeOutOfRange(_),
        ..
      } => "event_time_out_of_range",
    }
  }
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_config_error_display() {
    assert!(
      ConfigError::NonPositiveSlide
        .to_string()
        .contains("slide")
    );
    let err = ConfigError::DurationOutOfRange {
      field: "window_size",
      millis: 42,
    };
    assert!(err.to_string().contains("window_size"));
  }

  #[test]
  fn test_sink_error_converts_into_operator_error() {
    let err: OperatorError = SinkError::Closed.into();
    assert_eq!(err, OperatorError::Sink(SinkError::Closed));
    assert_eq!(err.to_string(), "result sink closed");
  }

  #[test]
  fn test_engine_error_display() {
    let err = EngineError::PartitionFailed {
      partition: 3,
      reason: "boom".to_string(),
    };
    assert_eq!(err.to_string(), "partition 3 failed: boom");
  }

  #[test]
  fn test_source_error_reason() {
    let err = SourceError::Invalid {
      line: 4,
      source: InputError::MissingKey,
    };
    assert_eq!(err.reason(), "missing_key");
    assert!(err.to_string().starts_with("line 4:"));
  }
}

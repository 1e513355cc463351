//! # Engine configuration
//!
//! [`EngineConfig`] is the validated, strongly typed configuration consumed by
//! the operator and the engine. It is built in code with `with_*` methods or
//! loaded from JSON through [`EngineConfigFile`], whose durations are plain
//! millisecond integers:
//!
//! ```json
//! {
//!   "window_size_ms": 900000,
//!   "window_slide_ms": 300000,
//!   "max_out_of_orderness_ms": 30000,
//!   "threshold": 20,
//!   "partition_count": 4,
//!   "late_data_policy": "side_output"
//! }
//! ```
//!
//! Omitted fields take the defaults of [`EngineConfig::default`].

use crate::error::ConfigError;
use crate::watermark::BoundedOutOfOrdernessGenerator;
use crate::window::{LateDataPolicy, SlidingWindowAssigner};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default window size: 15 minutes.
pub const DEFAULT_WINDOW_SIZE: Duration = Duration::from_secs(15 * 60);
/// Default slide: 5 minutes.
pub const DEFAULT_WINDOW_SLIDE: Duration = Duration::from_secs(5 * 60);
/// Default out-of-orderness tolerance: 30 seconds.
pub const DEFAULT_MAX_OUT_OF_ORDERNESS: Duration = Duration::from_secs(30);
/// Default threshold. Counts must be strictly greater to qualify.
pub const DEFAULT_THRESHOLD: u64 = 20;
/// Default number of partitions.
pub const DEFAULT_PARTITION_COUNT: usize = 4;
/// Default per-partition queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration for the windowed count engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Length of each window.
  pub window_size: Duration,
  /// Distance between consecutive window starts.
  pub window_slide: Duration,
  /// Alignment offset of window starts relative to the epoch.
  pub window_offset: Duration,
  /// How far behind the maximum seen event time the watermark trails.
  pub max_out_of_orderness: Duration,
  /// Counts must be strictly greater than this to be emitted.
  pub threshold: u64,
  /// Number of partition workers.
  pub partition_count: usize,
  /// Capacity of each partition's inbound queue.
  pub queue_capacity: usize,
  /// What to do with events that arrive after their window fired.
  pub late_data_policy: LateDataPolicy,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      window_size: DEFAULT_WINDOW_SIZE,
      window_slide: DEFAULT_WINDOW_SLIDE,
      window_offset: Duration::ZERO,
      max_out_of_orderness: DEFAULT_MAX_OUT_OF_ORDERNESS,
      threshold: DEFAULT_THRESHOLD,
      partition_count: DEFAULT_PARTITION_COUNT,
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      late_data_policy: LateDataPolicy::Drop,
    }
  }
}

impl EngineConfig {
  /// Creates a configuration with the default settings.
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets window size and slide.
  #[must_use]
  pub fn with_window(mut self, size: Duration, slide: Duration) -> Self {
    self.window_size = size;
    self.window_slide = slide;
    self
  }

  /// Sets the window alignment offset.
  #[must_use]
  pub fn with_window_offset(mut self, offset: Duration) -> Self {
    self.window_offset = offset;
    self
  }

  /// Sets the out-of-orderness tolerance.
  #[must_use]
  pub fn with_max_out_of_orderness(mut self, max_out_of_orderness: Duration) -> Self {
    self.max_out_of_orderness = max_out_of_orderness;
    self
  }

  /// Sets the emission threshold.
  #[must_use]
  pub fn with_threshold(mut self, threshold: u64) -> Self {
    self.threshold = threshold;
    self
  }

  /// Sets the number of partitions.
  #[must_use]
  pub fn with_partition_count(mut self, partition_count: usize) -> Self {
    self.partition_count = partition_count;
    self
  }

  /// Sets the per-partition queue capacity.
  #[must_use]
  pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
    self.queue_capacity = queue_capacity;
    self
  }

  /// Sets the late data policy.
  #[must_use]
  pub fn with_late_data_policy(mut self, policy: LateDataPolicy) -> Self {
    self.late_data_policy = policy;
    self
  }

  /// Checks that windowing is well defined and the engine can be sized.
  pub fn validate(&self) -> Result<(), ConfigError> {
    self.assigner()?;
    millis_i64("max_out_of_orderness", self.max_out_of_orderness)?;
    if self.partition_count == 0 {
      return Err(ConfigError::ZeroPartitions);
    }
    if self.queue_capacity == 0 {
      return Err(ConfigError::ZeroQueueCapacity);
    }
    Ok(())
  }

  /// Builds the sliding window assigner described by this configuration.
  pub fn assigner(&self) -> Result<SlidingWindowAssigner, ConfigError> {
    SlidingWindowAssigner::new(self.window_size, self.window_slide)?.with_offset(self.window_offset)
  }

  /// Builds a fresh watermark generator for one partition.
  pub fn watermark_generator(&self) -> BoundedOutOfOrdernessGenerator {
    BoundedOutOfOrdernessGenerator::new(self.max_out_of_orderness)
  }

  /// Parses and validates a JSON configuration document.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let file: EngineConfigFile = serde_json::from_str(json)?;
    let config = Self::from(file);
    config.validate()?;
    Ok(config)
  }

  /// Reads, parses and validates a JSON configuration file.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let json = std::fs::read_to_string(path)?;
    Self::from_json_str(&json)
  }
}

/// Serialized form of [`EngineConfig`], with durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfigFile {
  /// Window size in milliseconds.
  pub window_size_ms: u64,
  /// Window slide in milliseconds.
  pub window_slide_ms: u64,
  /// Window offset in milliseconds.
  pub window_offset_ms: u64,
  /// Out-of-orderness tolerance in milliseconds.
  pub max_out_of_orderness_ms: u64,
  /// Emission threshold.
  pub threshold: u64,
  /// Number of partitions.
  pub partition_count: usize,
  /// Per-partition queue capacity.
  pub queue_capacity: usize,
  /// Late data policy.
  pub late_data_policy: LateDataPolicy,
}

impl Default for EngineConfigFile {
  fn default() -> Self {
    EngineConfig::default().into()
  }
}

impl From<EngineConfigFile> for EngineConfig {
  fn from(file: EngineConfigFile) -> Self {
    Self {
      window_size: Duration::from_millis(file.window_size_ms),
      window_slide: Duration::from_millis(file.window_slide_ms),
      window_offset: Duration::from_millis(file.window_offset_ms),
      max_out_of_orderness: Duration::from_millis(file.max_out_of_orderness_ms),
      threshold: file.threshold,
      partition_count: file.partition_count,
      queue_capacity: file.queue_capacity,
      late_data_policy: file.late_data_policy,
    }
  }
}

impl From<EngineConfig> for EngineConfigFile {
  fn from(config: EngineConfig) -> Self {
    Self {
      window_size_ms: saturating_millis(config.window_size),
      window_slide_ms: saturating_millis(config.window_slide),
      window_offset_ms: saturating_millis(config.window_offset),
      max_out_of_orderness_ms: saturating_millis(config.max_out_of_orderness),
      threshold: config.threshold,
      partition_count: config.partition_count,
      queue_capacity: config.queue_capacity,
      late_data_policy: config.late_data_policy,
    }
  }
}

fn saturating_millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn millis_i64(field: &'static str, duration: Duration) -> Result<i64, ConfigError> {
  let millis = duration.as_millis();
  i64::try_from(millis).map_err(|_| ConfigError::DurationOutOfRange { field, millis })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_matches_canonical_job() {
    let config = EngineConfig::default();
    assert_eq!(config.window_size, Duration::from_secs(900));
    assert_eq!(config.window_slide, Duration::from_secs(300));
    assert_eq!(config.max_out_of_orderness, Duration::from_secs(30));
    assert_eq!(config.threshold, 20);
    assert_eq!(config.late_data_policy, LateDataPolicy::Drop);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_builder() {
    let config = EngineConfig::new()
      .with_window(Duration::from_secs(60), Duration::from_secs(20))
      .with_window_offset(Duration::from_secs(5))
      .with_max_out_of_orderness(Duration::ZERO)
      .with_threshold(2)
      .with_partition_count(8)
      .with_queue_capacity(16)
      .with_late_data_policy(LateDataPolicy::SideOutput);
    assert_eq!(config.partition_count, 8);
    assert_eq!(config.queue_capacity, 16);
    assert_eq!(config.assigner().unwrap().offset(), Duration::from_secs(5));
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_validate_rejects_overflowing_window() {
    let max = Duration::from_millis(i64::MAX as u64);
    let config = EngineConfig::new().with_window(max, max);
    assert!(matches!(
      config.validate(),
      Err(ConfigError::DurationOutOfRange {
        field: "window_size",
        ..
      })
    ));
    assert!(config.assigner().is_err());
  }

  #[test]
  fn test_validate_rejects_too_many_windows_per_element() {
    let day_by_millis =
      EngineConfig::new().with_window(Duration::from_secs(86_400), Duration::from_millis(1));
    assert!(matches!(
      day_by_millis.validate(),
      Err(ConfigError::TooManyWindowsPerElement {
        windows: 86_400_000,
        max: crate::window::MAX_WINDOWS_PER_ELEMENT,
      })
    ));

    let json = r#"{"window_size_ms": 86400000, "window_slide_ms": 1}"#;
    assert!(matches!(
      EngineConfig::from_json_str(json),
      Err(ConfigError::TooManyWindowsPerElement { .. })
    ));
  }

  #[test]
  fn test_validate_rejects_bad_values() {
    let zero_size = EngineConfig::new().with_window(Duration::ZERO, Duration::from_secs(1));
    assert!(matches!(
      zero_size.validate(),
      Err(ConfigError::NonPositiveWindowSize)
    ));

    let zero_slide = EngineConfig::new().with_window(Duration::from_secs(1), Duration::ZERO);
    assert!(matches!(
      zero_slide.validate(),
      Err(ConfigError::NonPositiveSlide)
    ));

    let zero_partitions = EngineConfig::new().with_partition_count(0);
    assert!(matches!(
      zero_partitions.validate(),
      Err(ConfigError::ZeroPartitions)
    ));

    let zero_capacity = EngineConfig::new().with_queue_capacity(0);
    assert!(matches!(
      zero_capacity.validate(),
      Err(ConfigError::ZeroQueueCapacity)
    ));

    let huge_lateness = EngineConfig::new().with_max_out_of_orderness(Duration::MAX);
    assert!(matches!(
      huge_lateness.validate(),
      Err(ConfigError::DurationOutOfRange {
        field: "max_out_of_orderness",
        ..
      })
    ));
  }

  #[test]
  fn test_from_json_str_fills_defaults() {
    let config = EngineConfig::from_json_str(r#"{"threshold": 5, "late_data_policy": "side_output"}"#)
      .unwrap();
    assert_eq!(config.threshold, 5);
    assert_eq!(config.late_data_policy, LateDataPolicy::SideOutput);
    assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
    assert_eq!(config.partition_count, DEFAULT_PARTITION_COUNT);
  }

  #[test]
  fn test_from_json_str_validates() {
    assert!(matches!(
      EngineConfig::from_json_str(r#"{"window_slide_ms": 0}"#),
      Err(ConfigError::NonPositiveSlide)
    ));
    assert!(matches!(
      EngineConfig::from_json_str(r#"{"unknown": 1}"#),
      Err(ConfigError::Parse(_))
    ));
  }

  #[test]
  fn test_file_round_trip_preserves_config() {
    let config = EngineConfig::new().with_threshold(7).with_partition_count(2);
    let file = EngineConfigFile::from(config.clone());
    assert_eq!(EngineConfig::from(file), config);
  }

  #[test]
  fn test_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(&path, r#"{"window_size_ms": 600000, "window_slide_ms": 240000}"#).unwrap();
    let config = EngineConfig::from_path(&path).unwrap();
    assert_eq!(config.window_size, Duration::from_secs(600));
    assert_eq!(config.window_slide, Duration::from_secs(240));

    assert!(matches!(
      EngineConfig::from_path(dir.path().join("missing.json")),
      Err(ConfigError::Io(_))
    ));
  }
}

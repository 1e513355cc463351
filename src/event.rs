//! # Event model
//!
//! Typed records flowing through the windowed-count core:
//!
//! - [`RawTrip`]: the decoded-but-unvalidated record handed over by a source.
//! - [`TripEvent`]: a validated event with a destination key and event time.
//! - [`DestinationResult`]: a qualifying `(destination, window, count)` result.
//! - [`LateTrip`]: an event that arrived after one of its windows fired, routed
//!   to the side output when that policy is enabled.
//!
//! ## Event time
//!
//! Event time is the pickup time embedded in the trip payload, in milliseconds
//! since the Unix epoch. It is converted to `DateTime<Utc>` once, at the
//! boundary, and the rest of the crate works with `chrono` timestamps.

use crate::error::InputError;
use crate::partitioning::PartitionKey;
use crate::window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trait for payload types that carry event time.
///
/// Return milliseconds since the Unix epoch, or `None` if the payload has no
/// event time.
pub trait HasEventTime {
  /// Returns the event time in milliseconds since the Unix epoch.
  fn event_time_ms(&self) -> Option<i64>;
}

/// Converts epoch milliseconds into a UTC timestamp.
pub fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, InputError> {
  DateTime::from_timestamp_millis(millis).ok_or(InputError::EventTimeOutOfRange(millis))
}

/// A trip record as decoded by the source, before the input contract is checked.
///
/// Field names follow the upstream trip schema. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrip {
  /// Destination location id.
  #[serde(default)]
  pub dest_location_id: Option<String>,
  /// Pickup time in epoch milliseconds.
  #[serde(default)]
  pub pickup_time: Option<i64>,
}

impl HasEventTime for RawTrip {
  fn event_time_ms(&self) -> Option<i64> {
    self.pickup_time
  }
}

/// A validated trip event: destination key plus event time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripEvent {
  destination: PartitionKey,
  pickup_time: DateTime<Utc>,
}

impl TripEvent {
  /// Creates an event from a key and an epoch-millisecond event time.
  ///
  /// # Errors
  ///
  /// Returns [`InputError::MissingKey`] for an empty key and
  /// [`InputError::EventTimeOutOfRange`] for an unrepresentable time.
  pub fn new(destination: impl Into<PartitionKey>, pickup_time_ms: i64) -> Result<Self, InputError> {
    Self::at(destination, millis_to_datetime(pickup_time_ms)?)
  }

  /// Creates an event from a key and a UTC timestamp.
  pub fn at(
    destination: impl Into<PartitionKey>,
    pickup_time: DateTime<Utc>,
  ) -> Result<Self, InputError> {
    let destination = destination.into();
    if destination.is_empty() {
      return Err(InputError::MissingKey);
    }
    Ok(Self {
      destination,
      pickup_time,
    })
  }

  /// Returns the destination key.
  pub fn destination(&self) -> &PartitionKey {
    &self.destination
  }

  /// Returns the event time.
  pub fn pickup_time(&self) -> DateTime<Utc> {
    self.pickup_time
  }
}

impl HasEventTime for TripEvent {
  fn event_time_ms(&self) -> Option<i64> {
    Some(self.pickup_time.timestamp_millis())
  }
}

impl TryFrom<RawTrip> for TripEvent {
  type Error = InputError;

  fn try_from(raw: RawTrip) -> Result<Self, Self::Error> {
    let destination = raw
      .dest_location_id
      .filter(|id| !id.is_empty())
      .ok_or(InputError::MissingKey)?;
    let pickup_time = raw.pickup_time.ok_or(InputError::MissingEventTime)?;
    TripEvent::new(destination, pickup_time)
  }
}

/// A destination whose trip count within a window exceeded the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationResult {
  /// Destination location id.
  #[serde(rename = "destLocationId")]
  pub destination: PartitionKey,
  /// Window start (inclusive).
  pub window_start: DateTime<Utc>,
  /// Window end (exclusive).
  pub window_end: DateTime<Utc>,
  /// Trips counted in the window.
  pub count: u64,
}

impl DestinationResult {
  /// Builds a result for a fired window.
  pub fn new(destination: PartitionKey, window: &TimeWindow, count: u64) -> Self {
    Self {
      destination,
      window_start: window.start(),
      window_end: window.end(),
      count,
    }
  }

  /// Returns the window this result was computed over.
  pub fn window(&self) -> TimeWindow {
    TimeWindow::new(self.window_start, self.window_end)
  }
}

/// An event excluded from a window that had already fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LateTrip {
  /// The late event.
  pub event: TripEvent,
  /// The window it was excluded from.
  pub window: TimeWindow,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_trip_event_new() {
    let event = TripEvent::new("161", 60_000).unwrap();
    assert_eq!(event.destination().as_str(), "161");
    assert_eq!(event.pickup_time().timestamp_millis(), 60_000);
    assert_eq!(event.event_time_ms(), Some(60_000));
  }

  #[test]
  fn test_trip_event_rejects_empty_key() {
    assert_eq!(TripEvent::new("", 0), Err(InputError::MissingKey));
  }

  #[test]
  fn test_trip_event_rejects_out_of_range_time() {
    assert_eq!(
      TripEvent::new("1", i64::MAX),
      Err(InputError::EventTimeOutOfRange(i64::MAX))
    );
  }

  #[test]
  fn test_raw_trip_conversion() {
    let raw = RawTrip {
      dest_location_id: Some("230".to_string()),
      pickup_time: Some(-300_000),
    };
    let event = TripEvent::try_from(raw).unwrap();
    assert_eq!(event.destination().as_str(), "230");
    assert_eq!(event.pickup_time().timestamp_millis(), -300_000);
  }

  #[test]
  fn test_raw_trip_missing_fields() {
    let missing_key = RawTrip {
      dest_location_id: None,
      pickup_time: Some(0),
    };
    assert_eq!(TripEvent::try_from(missing_key), Err(InputError::MissingKey));

    let missing_time = RawTrip {
      dest_location_id: Some("7".to_string()),
      pickup_time: None,
    };
    assert_eq!(
      TripEvent::try_from(missing_time),
      Err(InputError::MissingEventTime)
    );
  }

  #[test]
  fn test_raw_trip_ignores_unknown_fields() {
    let raw: RawTrip = serde_json::from_str(
      r#"{"rideId":1,"vendorId":2,"destLocationId":"48","pickupTime":1000,"tripDistance":3.5}"#,
    )
    .unwrap();
    assert_eq!(raw.dest_location_id.as_deref(), Some("48"));
    assert_eq!(raw.event_time_ms(), Some(1000));
  }

  #[test]
  fn test_destination_result_json_shape() {
    let window = TimeWindow::from_millis(0, 900_000).unwrap();
    let result = DestinationResult::new(PartitionKey::from("A"), &window, 4);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["destLocationId"], "A");
    assert_eq!(json["count"], 4);
    assert_eq!(json["windowStart"], "1970-01-01T00:00:00Z");
    assert_eq!(json["windowEnd"], "1970-01-01T00:15:00Z");
    assert_eq!(result.window(), window);
  }
}

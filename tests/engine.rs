//! End-to-end tests of the partitioned engine: routing, draining, failure
//! isolation and configuration checks.

use async_trait::async_trait;
use hopcount::config::EngineConfig;
use hopcount::emit::{ChannelSink, ResultSink, VecSink};
use hopcount::engine::PartitionedEngine;
use hopcount::error::{ConfigError, EngineError, SinkError};
use hopcount::event::{DestinationResult, TripEvent};
use hopcount::partitioning::{partition_for_key, PartitionKey};
use hopcount::source;
use std::collections::HashMap;
use std::time::Duration;

const MIN: i64 = 60_000;

fn config(threshold: u64, partitions: usize) -> EngineConfig {
  EngineConfig::new()
    .with_threshold(threshold)
    .with_partition_count(partitions)
    .with_queue_capacity(8)
}

/// Sink that rejects results for one destination.
#[derive(Clone)]
struct RejectingSink {
  poison: &'static str,
  inner: VecSink,
}

#[async_trait]
impl ResultSink for RejectingSink {
  async fn emit(&mut self, item: DestinationResult) -> Result<(), SinkError> {
    if item.destination.as_str() == self.poison {
      return Err(SinkError::Write("poisoned destination".to_string()));
    }
    self.inner.emit(item).await
  }
}

/// Sink that panics on one destination.
#[derive(Clone)]
struct PanickingSink {
  poison: &'static str,
}

#[async_trait]
impl ResultSink for PanickingSink {
  async fn emit(&mut self, item: DestinationResult) -> Result<(), SinkError> {
    if item.destination.as_str() == self.poison {
      panic!("sink exploded");
    }
    Ok(())
  }
}

#[tokio::test]
async fn counts_are_exact_across_partitions() {
  let sink = VecSink::new();
  let engine = PartitionedEngine::start(config(0, 4), sink.clone()).unwrap();

  // 20 destinations, destination i gets i + 1 trips in [0, 5) minutes.
  let mut expected = HashMap::new();
  for i in 0..20u64 {
    let key = format!("loc-{i}");
    for n in 0..=i {
      let at = (n as i64 % 5) * MIN;
      engine.submit(TripEvent::new(key.as_str(), at).unwrap()).await.unwrap();
    }
    expected.insert(key, i + 1);
  }

  let report = engine.shutdown().await.unwrap();
  assert!(report.is_success());
  assert_eq!(report.partitions.len(), 4);
  assert_eq!(report.total_events(), (1..=20).sum::<u64>());
  assert!(report.partitions.iter().all(|p| p.watermark.is_end_of_stream()));

  let results = sink.items().await;
  for (key, count) in &expected {
    let zero_window: Vec<_> = results
      .iter()
      .filter(|r| r.destination.as_str() == key && r.window_start.timestamp_millis() == 0)
      .collect();
    assert_eq!(zero_window.len(), 1, "{key}");
    assert_eq!(zero_window[0].count, *count);
  }
}

#[tokio::test]
async fn each_key_is_owned_by_one_partition() {
  let engine = PartitionedEngine::start(config(0, 3), VecSink::new()).unwrap();
  let mut per_partition = vec![0u64; 3];
  for i in 0..30 {
    let key = PartitionKey::from(format!("{i}"));
    let partition = engine.partition_for(&key);
    assert_eq!(partition, partition_for_key(&key, 3));
    per_partition[partition] += 1;
    engine.submit(TripEvent::new(key, 0).unwrap()).await.unwrap();
  }

  let report = engine.shutdown().await.unwrap();
  for partition_report in &report.partitions {
    assert_eq!(
      partition_report.events_processed,
      per_partition[partition_report.partition]
    );
  }
}

#[tokio::test]
async fn results_stream_through_channel_sink() {
  let (sink, mut receiver) = ChannelSink::channel(64);
  let engine = PartitionedEngine::start(config(1, 2), sink).unwrap();
  for _ in 0..2 {
    engine.submit(TripEvent::new("161", 0).unwrap()).await.unwrap();
  }
  engine.shutdown().await.unwrap();

  let mut received = Vec::new();
  while let Ok(result) = receiver.try_recv() {
    received.push(result);
  }
  assert_eq!(received.len(), 3);
  assert!(received.iter().all(|r| r.count == 2));
}

#[tokio::test]
async fn failing_partition_is_reported_and_others_complete() {
  let good = VecSink::new();
  let sink = RejectingSink {
    poison: "bad",
    inner: good.clone(),
  };
  let engine = PartitionedEngine::start(config(0, 4), sink).unwrap();
  let bad_partition = engine.partition_for(&PartitionKey::from("bad"));

  // Pick a healthy key on another partition.
  let good_key = (0..)
    .map(|i| format!("good-{i}"))
    .find(|k| engine.partition_for(&PartitionKey::from(k.as_str())) != bad_partition)
    .unwrap();

  engine.submit(TripEvent::new("bad", 0).unwrap()).await.unwrap();
  engine.submit(TripEvent::new(good_key.as_str(), 0).unwrap()).await.unwrap();

  let report = engine.shutdown_report().await;
  assert!(!report.is_success());
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].partition, bad_partition);
  assert!(report.failures[0].reason.contains("poisoned destination"));
  assert_eq!(report.partitions.len(), 3);

  assert!(
    good
      .items()
      .await
      .iter()
      .any(|r| r.destination.as_str() == good_key)
  );

  let err = report.into_result().unwrap_err();
  assert!(matches!(
    err,
    EngineError::PartitionFailed { partition, .. } if partition == bad_partition
  ));
}

#[tokio::test]
async fn panicking_partition_is_never_reported_as_success() {
  let engine = PartitionedEngine::start(config(0, 2), PanickingSink { poison: "boom" }).unwrap();
  engine.submit(TripEvent::new("boom", 0).unwrap()).await.unwrap();

  let err = engine.shutdown().await.unwrap_err();
  match err {
    EngineError::PartitionFailed { reason, .. } => assert!(reason.contains("sink exploded")),
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn submit_to_dead_partition_fails() {
  let engine = PartitionedEngine::start(
    config(0, 1).with_max_out_of_orderness(Duration::ZERO),
    RejectingSink {
      poison: "bad",
      inner: VecSink::new(),
    },
  )
  .unwrap();

  engine.submit(TripEvent::new("bad", 0).unwrap()).await.unwrap();
  // Closes every window of the first trip and kills the worker.
  engine.submit(TripEvent::new("bad", 60 * MIN).unwrap()).await.unwrap();

  let mut outcome = Ok(());
  for i in 0..100 {
    outcome = engine.submit(TripEvent::new("bad", (61 + i) * MIN).unwrap()).await;
    if outcome.is_err() {
      break;
    }
    tokio::task::yield_now().await;
  }
  assert!(matches!(
    outcome,
    Err(EngineError::PartitionUnavailable { partition: 0 })
  ));
  assert!(engine.shutdown().await.is_err());
}

#[tokio::test]
async fn invalid_config_is_rejected_at_start() {
  let err = PartitionedEngine::start(config(0, 0), VecSink::new()).unwrap_err();
  assert!(matches!(err, EngineError::Config(ConfigError::ZeroPartitions)));

  let err = PartitionedEngine::start(
    EngineConfig::new().with_window(Duration::from_secs(60), Duration::ZERO),
    VecSink::new(),
  )
  .unwrap_err();
  assert!(matches!(err, EngineError::Config(ConfigError::NonPositiveSlide)));
}

#[tokio::test]
async fn json_lines_feed_the_engine() {
  let input = r#"{"destLocationId":"161","pickupTime":0}
{"destLocationId":"161","pickupTime":60000}
garbage
{"destLocationId":"161","pickupTime":120000}
{"destLocationId":"7"}
"#;
  let sink = VecSink::new();
  let engine = PartitionedEngine::start(config(2, 2), sink.clone()).unwrap();

  use futures::StreamExt;
  let trips = source::valid_trips(input.as_bytes());
  futures::pin_mut!(trips);
  while let Some(trip) = trips.next().await {
    engine.submit(trip).await.unwrap();
  }
  let report = engine.shutdown().await.unwrap();

  assert_eq!(report.total_events(), 3);
  let results = sink.items().await;
  assert_eq!(results.len(), 3);
  assert!(results.iter().all(|r| r.count == 3 && r.destination.as_str() == "161"));
}

//! # Window operator
//!
//! One [`WindowOperator`] owns the complete windowed-count state of a single
//! partition: its watermark, its open accumulators and its emitter. Nothing in
//! here is shared, so the partition worker drives it without locks.
//!
//! Per event, the operator:
//!
//! 1. advances the watermark from the event time,
//! 2. assigns the event to every sliding window containing it,
//! 3. skips windows that already fired (late for that window only),
//! 4. increments the remaining accumulators,
//! 5. fires every accumulator whose window end the watermark has reached.
//!
//! A fired count goes through the threshold filter, so each `(key, window)`
//! produces at most one result, and only once its window is complete.

use crate::aggregate::CountAggregator;
use crate::config::EngineConfig;
use crate::emit::{Emitter, ResultSink, ThresholdFilter};
use crate::error::{ConfigError, OperatorError, OperatorResult};
use crate::event::{LateTrip, TripEvent};
use crate::metrics;
use crate::partitioning::PartitionKey;
use crate::watermark::{BoundedOutOfOrdernessGenerator, Watermark, WatermarkGenerator};
use crate::window::{
  AccumulatorState, LateDataPolicy, SlidingWindowAssigner, TimeWindow, TriggerResult,
  WindowAssigner, WindowTrigger,
};
use serde::Serialize;
use tracing::{debug, warn};

/// Counters describing what one partition has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
  /// Partition index.
  pub partition: usize,
  /// Events accepted by the partition.
  pub events_processed: u64,
  /// `(event, window)` pairs discarded because the window had already fired.
  pub late_drops: u64,
  /// Windows fired, whether or not they passed the threshold.
  pub windows_fired: u64,
  /// Results published to the sink.
  pub results_emitted: u64,
  /// Watermark when the report was taken.
  #[serde(serialize_with = "serialize_watermark")]
  pub watermark: Watermark,
}

fn serialize_watermark<S: serde::Serializer>(wm: &Watermark, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_str(&wm.to_string())
}

/// What processing a single event did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
  /// Windows the event was counted in.
  pub counted: usize,
  /// Windows the event was too late for.
  pub late: usize,
  /// Windows fired as a consequence of the event.
  pub fired: usize,
  /// Results emitted as a consequence of the event.
  pub emitted: usize,
}

/// Per-partition windowed count operator.
pub struct WindowOperator<S> {
  partition: usize,
  assigner: SlidingWindowAssigner,
  trigger: Box<dyn WindowTrigger<TimeWindow>>,
  watermarks: BoundedOutOfOrdernessGenerator,
  aggregator: CountAggregator,
  emitter: Emitter<S>,
  late_policy: LateDataPolicy,
  late_sink: Option<Box<dyn ResultSink<LateTrip>>>,
  report: PartitionReport,
}

impl<S> std::fmt::Debug for WindowOperator<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WindowOperator")
      .field("partition", &self.partition)
      .field("assigner", &self.assigner)
      .field("late_policy", &self.late_policy)
      .field("report", &self.report)
      .finish_non_exhaustive()
  }
}

impl<S: ResultSink> WindowOperator<S> {
  /// Creates the operator for `partition`.
  ///
  /// # Errors
  ///
  /// Fails if the window configuration is invalid.
  pub fn new(partition: usize, config: &EngineConfig, sink: S) -> Result<Self, ConfigError> {
    let assigner = config.assigner()?;
    let trigger = assigner.default_trigger();
    Ok(Self {
      partition,
      trigger,
      assigner,
      watermarks: config.watermark_generator(),
      aggregator: CountAggregator::new(),
      emitter: Emitter::new(ThresholdFilter::new(config.threshold), sink),
      late_policy: config.late_data_policy,
      late_sink: None,
      report: PartitionReport {
        partition,
        events_processed: 0,
        late_drops: 0,
        windows_fired: 0,
        results_emitted: 0,
        watermark: Watermark::min(),
      },
    })
  }

  /// Attaches the side output that receives late events.
  ///
  /// Only used under [`LateDataPolicy::SideOutput`]. A side output that
  /// rejects a record fails the partition, like the result sink does.
  #[must_use]
  pub fn with_late_sink(mut self, sink: impl ResultSink<LateTrip> + 'static) -> Self {
    self.late_sink = Some(Box::new(sink));
    self
  }

  /// Returns the partition index.
  pub fn partition(&self) -> usize {
    self.partition
  }

  /// Returns the current watermark.
  pub fn watermark(&self) -> Watermark {
    self.watermarks.current_watermark()
  }

  /// Returns the number of open accumulators.
  pub fn open_accumulators(&self) -> usize {
    self.aggregator.open_accumulators()
  }

  /// Returns the current count of `(key, window)`, if it is still open.
  pub fn open_count(&self, key: &PartitionKey, window: &TimeWindow) -> Option<u64> {
    self.aggregator.get(key, window)
  }

  /// Returns a snapshot of the partition counters.
  pub fn report(&self) -> PartitionReport {
    PartitionReport {
      watermark: self.watermark(),
      ..self.report
    }
  }

  /// Processes one event.
  ///
  /// Late windows are skipped and never create accumulators. Errors are
  /// fatal for the partition: either a sink rejected a result or the
  /// accumulator state is inconsistent.
  pub async fn process(&mut self, event: TripEvent) -> OperatorResult<ProcessOutcome> {
    let mut outcome = ProcessOutcome::default();
    let event_time = event.pickup_time();
    let advanced = self.watermarks.on_event(event_time).is_some();
    let watermark = self.watermarks.current_watermark();

    self.report.events_processed += 1;
    metrics::record_events_in(self.partition, 1);

    for window in self.assigner.assign_windows(event_time) {
      if window.is_complete(&watermark) {
        outcome.late += 1;
        self.on_late(&event, window, &watermark).await?;
        continue;
      }
      self.aggregator.increment(event.destination(), &window);
      self.trigger.on_element(event_time, &window);
      outcome.counted += 1;
    }

    if advanced {
      let (fired, emitted) = self.fire(&watermark).await?;
      outcome.fired = fired;
      outcome.emitted = emitted;
      metrics::record_watermark(self.partition, watermark.as_millis());
    }
    metrics::record_open_accumulators(self.partition, self.aggregator.open_accumulators());
    Ok(outcome)
  }

  /// Ends the stream: advances the watermark to +infinity and fires every
  /// remaining accumulator.
  pub async fn flush(&mut self) -> OperatorResult<PartitionReport> {
    let watermark = self.watermarks.on_end_of_stream();
    let mut fired = 0u64;
    let mut emitted = 0u64;

    for complete in self.aggregator.drain_complete(&watermark) {
      fired += 1;
      debug!(
        partition = self.partition,
        destination = %complete.key,
        window = %complete.window,
        count = complete.count,
        "window fired at end of stream"
      );
      if self
        .emitter
        .handle(complete.key, &complete.window, complete.count)
        .await?
      {
        emitted += 1;
      }
    }

    if !self.aggregator.is_empty() {
      return Err(OperatorError::StateCorrupted(format!(
        "{} accumulators left open after end of stream",
        self.aggregator.open_accumulators()
      )));
    }

    self.record_fired(fired, emitted);
    metrics::record_open_accumulators(self.partition, 0);
    Ok(self.report())
  }

  /// Fires every accumulator the trigger considers complete at `watermark`.
  async fn fire(&mut self, watermark: &Watermark) -> OperatorResult<(usize, usize)> {
    let mut fired = 0usize;
    let mut emitted = 0usize;

    for (key, window) in self.aggregator.candidates(watermark) {
      if self.trigger.on_event_time(watermark, &window) != TriggerResult::FireAndPurge {
        continue;
      }
      let count = self.aggregator.remove(&key, &window).ok_or_else(|| {
        OperatorError::StateCorrupted(format!("accumulator ({key}, {window}) vanished while firing"))
      })?;
      fired += 1;
      debug!(
        partition = self.partition,
        destination = %key,
        window = %window,
        count,
        state = ?AccumulatorState::Fired,
        "window fired"
      );
      if self.emitter.handle(key, &window, count).await? {
        emitted += 1;
      }
    }

    self.record_fired(fired as u64, emitted as u64);
    Ok((fired, emitted))
  }

  async fn on_late(
    &mut self,
    event: &TripEvent,
    window: TimeWindow,
    watermark: &Watermark,
  ) -> OperatorResult<()> {
    self.report.late_drops += 1;
    metrics::record_late_events(self.partition, 1);
    debug!(
      partition = self.partition,
      destination = %event.destination(),
      window = %window,
      watermark = %watermark,
      state = ?AccumulatorState::DiscardedLate,
      "late event skipped for fired window"
    );

    if self.late_policy != LateDataPolicy::SideOutput {
      return Ok(());
    }
    let Some(sink) = self.late_sink.as_mut() else {
      return Ok(());
    };
    let late = LateTrip {
      event: event.clone(),
      window,
    };
    sink.emit(late).await.map_err(|e| {
      warn!(
        partition = self.partition,
        error = %e,
        "late side output rejected event"
      );
      OperatorError::Sink(e)
    })
  }

  fn record_fired(&mut self, fired: u64, emitted: u64) {
    self.report.windows_fired += fired;
    self.report.results_emitted += emitted;
    if fired > 0 {
      metrics::record_windows_fired(self.partition, fired);
    }
    if emitted > 0 {
      metrics::record_results_emitted(self.partition, emitted);
    }
  }
}

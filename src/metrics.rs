//! Prometheus-compatible metrics for hopcount.
//!
//! Every series is labelled with the owning `partition`. Recording is a no-op
//! until a recorder is installed, so library users who do not care about
//! metrics pay only for the macro calls.
//!
//! - **Throughput:** [`record_events_in`] and [`record_results_emitted`] feed
//!   `hopcount_events_in_total` and `hopcount_results_emitted_total`.
//! - **Completeness:** [`record_late_events`] feeds `hopcount_late_events_total`,
//!   one increment per `(event, window)` pair that arrived after the window fired.
//! - **Firing:** [`record_windows_fired`] feeds `hopcount_windows_fired_total`.
//! - **Input quality:** [`record_invalid_input`] feeds `hopcount_invalid_input_total`.
//! - **Progress:** [`record_watermark`] and [`record_open_accumulators`] set the
//!   `hopcount_watermark_ms` and `hopcount_open_accumulators` gauges.
//!
//! # Example
//!
//! ```rust,no_run
//! use hopcount::metrics;
//!
//! // At startup, install the Prometheus recorder with an HTTP listener
//! metrics::install_prometheus_recorder_on("0.0.0.0:9090".parse().unwrap()).unwrap();
//! ```

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Installs the Prometheus recorder on the default listen address.
///
/// Call once at startup. Fails if a global recorder is already installed.
pub fn install_prometheus_recorder() -> Result<(), BuildError> {
  PrometheusBuilder::new().install()
}

/// Installs the Prometheus recorder and serves `GET /metrics` on `addr`.
pub fn install_prometheus_recorder_on(addr: SocketAddr) -> Result<(), BuildError> {
  PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Records events accepted by a partition.
pub fn record_events_in(partition: usize, count: u64) {
  counter!("hopcount_events_in_total", "partition" => partition.to_string()).increment(count);
}

/// Records `(event, window)` pairs discarded because the window already fired.
pub fn record_late_events(partition: usize, count: u64) {
  counter!("hopcount_late_events_total", "partition" => partition.to_string()).increment(count);
}

/// Records windows fired by a partition, whether or not they passed the threshold.
pub fn record_windows_fired(partition: usize, count: u64) {
  counter!("hopcount_windows_fired_total", "partition" => partition.to_string()).increment(count);
}

/// Records results published to the sink.
pub fn record_results_emitted(partition: usize, count: u64) {
  counter!("hopcount_results_emitted_total", "partition" => partition.to_string())
    .increment(count);
}

/// Records a record rejected at the ingestion boundary.
///
/// Rejection happens before routing, so this series carries a `reason` label
/// instead of a partition.
pub fn record_invalid_input(reason: &'static str) {
  counter!("hopcount_invalid_input_total", "reason" => reason).increment(1);
}

/// Sets the current watermark of a partition, in epoch milliseconds.
pub fn record_watermark(partition: usize, watermark_ms: i64) {
  gauge!("hopcount_watermark_ms", "partition" => partition.to_string()).set(watermark_ms as f64);
}

/// Sets the number of open accumulators held by a partition.
pub fn record_open_accumulators(partition: usize, open: usize) {
  gauge!("hopcount_open_accumulators", "partition" => partition.to_string()).set(open as f64);
}

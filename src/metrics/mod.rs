//! Prometheus metrics for the participation service
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};
use std::sync::OnceLock;

/// Container for all participation metrics
struct ParticipationMetrics {
    joins_total: Counter,
    join_rejections: CounterVec,
    join_duration: Histogram,
    drain_cycles: Counter,
    drain_malformed_entries: Counter,
    broadcast_batches: CounterVec,
    broadcast_entries: CounterVec,
}

static METRICS: OnceLock<ParticipationMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Initialize all Prometheus metrics
///
/// Should be called once at application startup; a second call is a no-op.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = ParticipationMetrics {
        joins_total: register_counter!(
            "seonchak_joins_total",
            "Total successful join requests"
        )?,
        join_rejections: register_counter_vec!(
            "seonchak_join_rejections_total",
            "Join requests rejected, by reason",
            &["reason"]
        )?,
        join_duration: register_histogram!(
            "seonchak_join_duration_seconds",
            "End-to-end join request duration in seconds",
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
        drain_cycles: register_counter!(
            "seonchak_drain_cycles_total",
            "Total drain cycles executed"
        )?,
        drain_malformed_entries: register_counter!(
            "seonchak_drain_malformed_entries_total",
            "Relay queue entries skipped because they failed to parse"
        )?,
        broadcast_batches: register_counter_vec!(
            "seonchak_broadcast_batches_total",
            "Batches published, by path (optimistic, authoritative)",
            &["path"]
        )?,
        broadcast_entries: register_counter_vec!(
            "seonchak_broadcast_entries_total",
            "Entries published, by path (optimistic, authoritative)",
            &["path"]
        )?,
    };

    METRICS
        .set(metrics)
        .map_err(|_| "metrics already initialized")?;

    Ok(())
}

/// Record a successful join
pub fn record_join(duration_secs: f64) {
    if let Some(m) = METRICS.get() {
        m.joins_total.inc();
        m.join_duration.observe(duration_secs);
    }
}

/// Record a rejected join
pub fn record_join_rejection(reason: &str) {
    if let Some(m) = METRICS.get() {
        m.join_rejections.with_label_values(&[reason]).inc();
    }
}

/// Record a completed drain cycle
pub fn record_drain_cycle(malformed_entries: u64) {
    if let Some(m) = METRICS.get() {
        m.drain_cycles.inc();
        if malformed_entries > 0 {
            m.drain_malformed_entries.inc_by(malformed_entries as f64);
        }
    }
}

/// Record a published batch
pub fn record_broadcast(path: &str, entries: usize) {
    if let Some(m) = METRICS.get() {
        m.broadcast_batches.with_label_values(&[path]).inc();
        m.broadcast_entries
            .with_label_values(&[path])
            .inc_by(entries as f64);
    }
}

/// Gather all metrics in Prometheus text exposition format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

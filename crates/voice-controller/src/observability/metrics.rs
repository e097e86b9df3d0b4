//! Metrics definitions for the Voice Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `vc_` prefix for Voice Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `actor_type`: 2 values (controller, call)
//! - `operation`: bounded by the actor message enums (~14 values)
//! - `event`: bounded by the signal vocabulary (10 values)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded. Operation latencies are
/// in-process actor round-trips, so the duration buckets run from 100µs to
/// one second.
///
/// # Errors
///
/// Returns error if the Prometheus recorder fails to install (e.g., already
/// installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("vc_operation_duration".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set operation duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session & Participant Metrics (Gauges)
// ============================================================================

/// Set the number of live call sessions.
///
/// Metric: `vc_sessions_active`
/// Labels: none
///
/// Updated by the controller's periodic sweep.
pub fn set_sessions_active(count: usize) {
    // usize to f64 conversion is safe for realistic session counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("vc_sessions_active").set(count as f64);
}

/// Set the number of participants across all live sessions.
///
/// Metric: `vc_participants_active`
/// Labels: none
pub fn set_participants_active(count: usize) {
    // usize to f64 conversion is safe for realistic participant counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("vc_participants_active").set(count as f64);
}

// ============================================================================
// Actor Mailbox Metrics (Gauges)
// ============================================================================

/// Set the mailbox depth for an actor type.
///
/// Metric: `vc_actor_mailbox_depth`
/// Labels: `actor_type` (controller, call)
///
/// Cardinality: 2 (bounded by `ActorType` enum)
///
/// Used for backpressure monitoring. High values indicate the actor is
/// falling behind in message processing.
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    // usize to f64 conversion is safe for realistic mailbox depths
    #[allow(clippy::cast_precision_loss)]
    gauge!("vc_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

// ============================================================================
// Latency Metrics (Histograms)
// ============================================================================

/// Record call operation processing latency.
///
/// Metric: `vc_operation_duration_seconds`
/// Labels: `operation`
///
/// Cardinality: ~14 (bounded by the actor message enums)
pub fn record_operation_duration(operation: &str, duration: Duration) {
    histogram!("vc_operation_duration_seconds", "operation" => operation.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Signal Metrics (Counters)
// ============================================================================

/// Record a signal event fanned out to a room.
///
/// Metric: `vc_signals_published_total`
/// Labels: `event`
///
/// Cardinality: 10 (bounded by the signal vocabulary)
pub fn record_signal_published(event: &str) {
    counter!("vc_signals_published_total", "event" => event.to_string()).increment(1);
}

// ============================================================================
// Additional Operational Metrics
// ============================================================================

/// Record a pending call that expired without an answer.
///
/// Metric: `vc_sessions_expired_total`
/// Labels: none
pub fn record_session_expired() {
    counter!("vc_sessions_expired_total").increment(1);
}

/// Record an actor panic event.
///
/// Metric: `vc_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug and should trigger investigation.
pub fn record_actor_panic(actor_type: &str) {
    counter!("vc_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}

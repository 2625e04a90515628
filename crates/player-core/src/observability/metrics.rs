//! Metrics definitions for the stream player.
//!
//! All metrics follow Prometheus naming conventions:
//! - `player_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded enums, never stream IDs:
//! - `state`: 6 values (`SessionState`)
//! - `result`: 2 values (success, failure)
//! - `error_type`: bounded by `PlayerError` variants
//! - `actor_type`: 2 values (manager, session)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return its handle.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Outages last from a second up to the 20 minute ceiling
        .set_buckets_for_metric(
            Matcher::Full("player_reconnect_recovery_seconds".to_string()),
            &[
                1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0,
            ],
        )
        .map_err(|e| format!("Failed to set reconnect recovery buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("player_snapshot_duration_seconds".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000],
        )
        .map_err(|e| format!("Failed to set snapshot duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Sessions
// ============================================================================

/// Metric: `player_sessions_active`
pub fn set_sessions_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("player_sessions_active").set(count as f64);
}

/// Metric: `player_state_transitions_total`
/// Labels: `state`
pub fn record_state_transition(state: &'static str) {
    counter!("player_state_transitions_total", "state" => state).increment(1);
}

// ============================================================================
// Reconnection
// ============================================================================

/// Metric: `player_reconnect_attempts_total`
pub fn record_reconnect_attempt() {
    counter!("player_reconnect_attempts_total").increment(1);
}

/// Metric: `player_reconnect_given_up_total`
pub fn record_reconnect_given_up() {
    counter!("player_reconnect_given_up_total").increment(1);
}

/// Time from the first failure of an outage to recovery.
///
/// Metric: `player_reconnect_recovery_seconds`
pub fn record_reconnect_recovery(duration: Duration) {
    histogram!("player_reconnect_recovery_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Snapshots
// ============================================================================

/// Metric: `player_snapshots_total`, `player_snapshot_duration_seconds`
/// Labels: `result` (success, failure)
pub fn record_snapshot(success: bool, duration: Duration) {
    let result = if success { "success" } else { "failure" };
    counter!("player_snapshots_total", "result" => result).increment(1);
    histogram!("player_snapshot_duration_seconds", "result" => result)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Errors & actors
// ============================================================================

/// Metric: `player_errors_total`
/// Labels: `error_type` (`PlayerError::error_type_label`)
pub fn record_error(error_type: &'static str) {
    counter!("player_errors_total", "error_type" => error_type).increment(1);
}

/// Event dropped because the target session's mailbox was full.
///
/// Metric: `player_events_dropped_total`
/// Labels: `event` (`PipelineEventKind::as_str` or a notification name)
pub fn record_event_dropped(event: &'static str) {
    counter!("player_events_dropped_total", "event" => event).increment(1);
}

/// Metric: `player_actor_panics_total`
/// Labels: `actor_type`
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("player_actor_panics_total", "actor_type" => actor_type).increment(1);
}

//! Observability for the stream player.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `player_sessions_active` | Gauge | none | Registered playback sessions |
//! | `player_state_transitions_total` | Counter | `state` | Session state changes |
//! | `player_reconnect_attempts_total` | Counter | none | Retry attempts started |
//! | `player_reconnect_given_up_total` | Counter | none | Sessions that hit the ceiling |
//! | `player_reconnect_recovery_seconds` | Histogram | none | Outage duration before recovery |
//! | `player_snapshots_total` | Counter | `result` | Snapshot outcomes |
//! | `player_errors_total` | Counter | `error_type` | Errors returned to callers |
//!
//! # Logging
//!
//! [`init_tracing`] installs the global subscriber for the binary.

pub mod metrics;

pub use metrics::{
    init_metrics_recorder, record_actor_panic, record_error, record_event_dropped,
    record_reconnect_attempt,
    record_reconnect_given_up, record_reconnect_recovery, record_snapshot,
    record_state_transition, set_sessions_active,
};

use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a subscriber is
/// already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), String> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|e| format!("Invalid log filter '{}': {e}", config.log_filter))?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
    .map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}

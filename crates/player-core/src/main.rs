//! Stream Player
//!
//! Development binary that runs the playback subsystem over the in-process
//! loopback pipeline.
//!
//! # Startup Flow
//!
//! 1. Load observability configuration and install tracing
//! 2. Load player configuration from environment
//! 3. Initialize Prometheus metrics recorder
//! 4. Spawn the `PlayerManagerActor` over a `LoopbackPipeline`
//! 5. Start every stream listed in `PLAYER_STREAM_IDS`
//! 6. Wait for shutdown signal

#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use common::config::ObservabilityConfig;
use player_core::config::Config;
use player_core::observability::{init_metrics_recorder, init_tracing};
use player_core::pipeline::{LoopbackPipeline, MediaPipeline, PipelineEventSink, PIPELINE_EVENT_BUFFER};
use player_core::PlayerManagerHandle;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Bound on waiting for sessions to stop at shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let observability = ObservabilityConfig::from_env();
    init_tracing(&observability)?;

    info!("Starting Stream Player");

    let config = Config::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        reconnect_ceiling_secs = config.reconnect_ceiling.as_secs(),
        max_sessions = config.max_sessions,
        "Configuration loaded successfully"
    );

    let prometheus_handle = init_metrics_recorder()?;
    info!("Prometheus metrics recorder initialized");

    let (sink, pipeline_events) = PipelineEventSink::channel(PIPELINE_EVENT_BUFFER);
    let pipeline: Arc<dyn MediaPipeline> = Arc::new(LoopbackPipeline::new(sink));
    let manager = PlayerManagerHandle::new(config, pipeline, pipeline_events);

    let mut updates = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => info!(
                    stream_id = %update.stream_id,
                    state = update.state.as_str(),
                    error_code = update.error_code,
                    extra_info = %update.extra_info,
                    "State update"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "State update log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    for stream_id in stream_ids_from_env() {
        if let Err(e) = manager.start_playing_stream(&stream_id, None, None).await {
            warn!(stream_id = %stream_id, error = %e, "Failed to start stream");
        }
    }

    info!("Stream Player running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    if let Err(e) = manager.shutdown(SHUTDOWN_DEADLINE).await {
        warn!(error = %e, "Player shutdown error");
    }

    info!(metrics = %prometheus_handle.render(), "Final metrics");
    info!("Stream Player shutdown complete");

    Ok(())
}

/// Comma separated stream IDs from `PLAYER_STREAM_IDS`.
fn stream_ids_from_env() -> Vec<String> {
    std::env::var("PLAYER_STREAM_IDS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without them the player
/// cannot shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

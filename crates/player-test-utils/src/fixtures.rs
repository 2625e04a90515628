//! Pre-configured test data fixtures for player testing.
//!
//! Provides:
//! - Stream IDs (fixed and random)
//! - Decryption keys of valid and invalid lengths
//! - Player configuration with deterministic retry timing
//! - `TestPlayer`, a manager wired to a `MockPipeline`

use crate::mock_pipeline::{ConnectBehavior, MockPipeline};
use crate::recorder::StateRecorder;
use player_core::config::Config;
use player_core::pipeline::{MediaPipeline, PipelineEventSink, PIPELINE_EVENT_BUFFER};
use player_core::reconnect::ReconnectPolicy;
use player_core::PlayerManagerHandle;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const STREAM_A: &str = "stream-a";
pub const STREAM_B: &str = "stream-b";

/// A stream ID no test starts.
pub const UNKNOWN_STREAM: &str = "stream-unknown";

/// Random valid stream ID.
#[must_use]
pub fn random_stream_id() -> String {
    format!("stream-{}", Uuid::new_v4())
}

/// Random key of `len` bytes.
#[must_use]
pub fn test_key(len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Config with jitter disabled so retry timing is exact.
///
/// Retries at 1, 2, 4, 8, 16, 30, 30 ... seconds; 20 minute ceiling.
#[must_use]
pub fn deterministic_config() -> Config {
    Config {
        instance_id: "player-test".to_string(),
        retry_jitter: 0.0,
        ..Config::default()
    }
}

/// Policy matching [`deterministic_config`].
#[must_use]
pub fn deterministic_policy() -> ReconnectPolicy {
    deterministic_config().reconnect_policy()
}

/// Config with a short ceiling for fast give-up tests.
#[must_use]
pub fn short_ceiling_config(ceiling: Duration) -> Config {
    Config {
        reconnect_ceiling: ceiling,
        ..deterministic_config()
    }
}

/// Player manager wired to a `MockPipeline`.
pub struct TestPlayer {
    pub manager: PlayerManagerHandle,
    pub pipeline: Arc<MockPipeline>,
}

impl TestPlayer {
    /// Deterministic config; every connect answered with `behavior`.
    #[must_use]
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self::with_config(deterministic_config(), behavior, Vec::new())
    }

    #[must_use]
    pub fn with_config(
        config: Config,
        behavior: ConnectBehavior,
        script: Vec<ConnectBehavior>,
    ) -> Self {
        let (sink, events) = PipelineEventSink::channel(PIPELINE_EVENT_BUFFER);
        let pipeline = Arc::new(MockPipeline::new(sink, behavior).with_script(script));
        let manager = PlayerManagerHandle::new(
            config,
            Arc::clone(&pipeline) as Arc<dyn MediaPipeline>,
            events,
        );
        Self { manager, pipeline }
    }

    /// Recorder subscribed from this point on.
    #[must_use]
    pub fn recorder(&self) -> StateRecorder {
        StateRecorder::new(self.manager.subscribe())
    }
}

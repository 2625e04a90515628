//! Mock media pipeline for player testing.
//!
//! Provides a `MediaPipeline` implementation that can be configured to:
//! - Accept connects (with or without SVC), fail them, or never answer
//! - Follow a per-attempt script before falling back to a default
//! - Return a chosen snapshot result, optionally after a delay
//! - Hold setting commands (key, volume, mute, layer, canvas) for a while
//!
//! Every command is recorded so tests can assert on what the player sent.
//!
//! # Example
//!
//! ```rust,ignore
//! use player_test_utils::{ConnectBehavior, MockPipeline};
//!
//! let (sink, events) = PipelineEventSink::channel(PIPELINE_EVENT_BUFFER);
//! let mock = MockPipeline::new(sink, ConnectBehavior::accept())
//!     .with_script(vec![ConnectBehavior::fail("refused")]);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use common::types::StreamId;
use player_core::keys::DecryptionKey;
use player_core::layer::VideoLayer;
use player_core::pipeline::{
    ConnectRequest, MediaPipeline, PipelineError, PipelineEventKind, PipelineEventSink,
};
use player_core::types::Canvas;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How the mock answers one connect call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Accept and report `Connected`.
    Accept { svc: bool },
    /// Accept, then report `ConnectFailed`.
    Fail(String),
    /// Return an error from `connect` itself.
    Reject(PipelineError),
    /// Accept and never report anything (exercises the attempt timeout).
    Silent,
}

impl ConnectBehavior {
    /// Accept with an SVC publisher.
    #[must_use]
    pub fn accept() -> Self {
        Self::Accept { svc: true }
    }

    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }
}

/// A command received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCommand {
    Connect {
        stream_id: StreamId,
        attempt: u32,
        volume: u32,
        audio_muted: bool,
        video_muted: bool,
        layer: VideoLayer,
        key_len: Option<usize>,
        hardware_decode: bool,
        check_poc: bool,
        canvas: Option<Canvas>,
    },
    Disconnect(StreamId),
    SetKey { stream_id: StreamId, len: usize },
    SetVolume { stream_id: StreamId, volume: u32 },
    SetAudioMuted { stream_id: StreamId, muted: bool },
    SetVideoMuted { stream_id: StreamId, muted: bool },
    SwitchLayer { stream_id: StreamId, layer: VideoLayer },
    RebindCanvas { stream_id: StreamId, canvas: Option<Canvas> },
    Snapshot(StreamId),
}

impl PipelineCommand {
    /// Stream the command targets.
    #[must_use]
    pub fn stream_id(&self) -> &StreamId {
        match self {
            Self::Connect { stream_id, .. }
            | Self::SetKey { stream_id, .. }
            | Self::SetVolume { stream_id, .. }
            | Self::SetAudioMuted { stream_id, .. }
            | Self::SetVideoMuted { stream_id, .. }
            | Self::SwitchLayer { stream_id, .. }
            | Self::RebindCanvas { stream_id, .. } => stream_id,
            Self::Disconnect(stream_id) | Self::Snapshot(stream_id) => stream_id,
        }
    }
}

/// Mock pipeline for player tests.
pub struct MockPipeline {
    sink: PipelineEventSink,
    default_behavior: Mutex<ConnectBehavior>,
    script: Mutex<VecDeque<ConnectBehavior>>,
    commands: Mutex<Vec<PipelineCommand>>,
    connect_count: AtomicUsize,
    snapshot_result: Mutex<Result<Bytes, PipelineError>>,
    snapshot_delay: Mutex<Option<Duration>>,
    command_delay: Mutex<Option<Duration>>,
}

impl MockPipeline {
    /// Create a mock that answers every connect with `behavior`.
    #[must_use]
    pub fn new(sink: PipelineEventSink, behavior: ConnectBehavior) -> Self {
        Self {
            sink,
            default_behavior: Mutex::new(behavior),
            script: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
            connect_count: AtomicUsize::new(0),
            snapshot_result: Mutex::new(Ok(Bytes::from_static(b"P6\n1 1\n255\n\x80\x80\x80"))),
            snapshot_delay: Mutex::new(None),
            command_delay: Mutex::new(None),
        }
    }

    /// Behaviors consumed by the next connects, in order.
    #[must_use]
    pub fn with_script(self, script: Vec<ConnectBehavior>) -> Self {
        *self.script.lock().unwrap() = script.into();
        self
    }

    /// Replace the behavior used once the script is exhausted.
    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        *self.default_behavior.lock().unwrap() = behavior;
    }

    pub fn set_snapshot_result(&self, result: Result<Bytes, PipelineError>) {
        *self.snapshot_result.lock().unwrap() = result;
    }

    /// Delay every snapshot by `delay`.
    pub fn set_snapshot_delay(&self, delay: Duration) {
        *self.snapshot_delay.lock().unwrap() = Some(delay);
    }

    /// Hold every setting command for `delay` after recording it.
    pub fn set_command_delay(&self, delay: Duration) {
        *self.command_delay.lock().unwrap() = Some(delay);
    }

    /// Report an event for `stream_id` as the pipeline would.
    pub async fn emit(&self, stream_id: &str, kind: PipelineEventKind) {
        let stream_id = StreamId::parse(stream_id).expect("valid stream id");
        assert!(self.sink.emit(stream_id, kind).await, "event sink closed");
    }

    /// Number of connect calls received.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Every command received so far.
    #[must_use]
    pub fn commands(&self) -> Vec<PipelineCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Commands for one stream.
    #[must_use]
    pub fn commands_for(&self, stream_id: &str) -> Vec<PipelineCommand> {
        self.commands()
            .into_iter()
            .filter(|c| c.stream_id().as_str() == stream_id)
            .collect()
    }

    /// Most recent connect command for a stream.
    #[must_use]
    pub fn last_connect(&self, stream_id: &str) -> Option<PipelineCommand> {
        self.commands_for(stream_id)
            .into_iter()
            .rev()
            .find(|c| matches!(c, PipelineCommand::Connect { .. }))
    }

    pub fn clear_commands(&self) {
        self.commands.lock().unwrap().clear();
    }

    fn record(&self, command: PipelineCommand) {
        self.commands.lock().unwrap().push(command);
    }

    async fn record_setting(&self, command: PipelineCommand) {
        self.record(command);
        let delay = *self.command_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn next_behavior(&self) -> ConnectBehavior {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_behavior.lock().unwrap().clone())
    }
}

#[async_trait]
impl MediaPipeline for MockPipeline {
    async fn connect(&self, request: ConnectRequest) -> Result<(), PipelineError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.record(PipelineCommand::Connect {
            stream_id: request.stream_id.clone(),
            attempt: request.attempt,
            volume: request.volume,
            audio_muted: request.audio_muted,
            video_muted: request.video_muted,
            layer: request.layer,
            key_len: request.key.as_ref().map(|k| k.len()),
            hardware_decode: request.decoder.hardware_decode,
            check_poc: request.decoder.check_poc,
            canvas: request.canvas.clone(),
        });

        let event = match self.next_behavior() {
            ConnectBehavior::Accept { svc } => Some(PipelineEventKind::Connected { svc }),
            ConnectBehavior::Fail(reason) => Some(PipelineEventKind::ConnectFailed { reason }),
            ConnectBehavior::Reject(err) => return Err(err),
            ConnectBehavior::Silent => None,
        };

        if let Some(kind) = event {
            self.sink.emit(request.stream_id, kind).await;
        }
        Ok(())
    }

    async fn disconnect(&self, stream_id: &StreamId) -> Result<(), PipelineError> {
        self.record(PipelineCommand::Disconnect(stream_id.clone()));
        Ok(())
    }

    async fn set_key(
        &self,
        stream_id: &StreamId,
        key: &DecryptionKey,
    ) -> Result<(), PipelineError> {
        self.record_setting(PipelineCommand::SetKey {
            stream_id: stream_id.clone(),
            len: key.len(),
        })
        .await;
        Ok(())
    }

    async fn set_volume(&self, stream_id: &StreamId, volume: u32) -> Result<(), PipelineError> {
        self.record_setting(PipelineCommand::SetVolume {
            stream_id: stream_id.clone(),
            volume,
        })
        .await;
        Ok(())
    }

    async fn set_audio_muted(
        &self,
        stream_id: &StreamId,
        muted: bool,
    ) -> Result<(), PipelineError> {
        self.record_setting(PipelineCommand::SetAudioMuted {
            stream_id: stream_id.clone(),
            muted,
        })
        .await;
        Ok(())
    }

    async fn set_video_muted(
        &self,
        stream_id: &StreamId,
        muted: bool,
    ) -> Result<(), PipelineError> {
        self.record_setting(PipelineCommand::SetVideoMuted {
            stream_id: stream_id.clone(),
            muted,
        })
        .await;
        Ok(())
    }

    async fn switch_layer(
        &self,
        stream_id: &StreamId,
        layer: VideoLayer,
    ) -> Result<(), PipelineError> {
        self.record_setting(PipelineCommand::SwitchLayer {
            stream_id: stream_id.clone(),
            layer,
        })
        .await;
        Ok(())
    }

    async fn rebind_canvas(
        &self,
        stream_id: &StreamId,
        canvas: Option<&Canvas>,
    ) -> Result<(), PipelineError> {
        self.record_setting(PipelineCommand::RebindCanvas {
            stream_id: stream_id.clone(),
            canvas: canvas.cloned(),
        })
        .await;
        Ok(())
    }

    async fn request_snapshot(&self, stream_id: &StreamId) -> Result<Bytes, PipelineError> {
        self.record(PipelineCommand::Snapshot(stream_id.clone()));
        let delay = *self.snapshot_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.snapshot_result.lock().unwrap().clone()
    }
}

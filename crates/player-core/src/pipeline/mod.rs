//! Media pipeline boundary.
//!
//! The pipeline decodes and renders media; the player only issues commands
//! to it. Commands return once the pipeline has accepted them. Progress
//! (connected, frames, loss) comes back asynchronously through a
//! [`PipelineEventSink`] handed to the pipeline at construction.

mod loopback;

pub use loopback::LoopbackPipeline;

use crate::decoder::DecoderSettings;
use crate::keys::DecryptionKey;
use crate::layer::VideoLayer;
use crate::types::{Canvas, ResourceMode};
use bytes::Bytes;
use common::types::StreamId;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default buffer size for the pipeline event channel.
pub const PIPELINE_EVENT_BUFFER: usize = 1024;

/// Errors returned by pipeline commands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("network unavailable: {0}")]
    Network(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("no decodable frame available")]
    NoFrame,

    #[error("stream not connected")]
    NotConnected,

    #[error("command rejected: {0}")]
    Rejected(String),
}

/// Everything the pipeline needs to open a stream.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub stream_id: StreamId,
    /// `None` plays audio only.
    pub canvas: Option<Canvas>,
    pub layer: VideoLayer,
    pub decoder: DecoderSettings,
    pub key: Option<Arc<DecryptionKey>>,
    pub volume: u32,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub resource_mode: ResourceMode,
    pub cdn_url: Option<String>,
    /// 0 for the initial connect, then the retry number within an outage.
    pub attempt: u32,
}

/// Asynchronous progress reported by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEventKind {
    /// Connection established. `svc` tells whether the publisher offers
    /// multiple layers.
    Connected { svc: bool },
    FrameDecoded,
    NetworkLost,
    DecodeError { reason: String },
    ConnectFailed { reason: String },
    /// The pipeline's automatic layer heuristic switched layers.
    LayerChanged { layer: VideoLayer },
}

impl PipelineEventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PipelineEventKind::Connected { .. } => "connected",
            PipelineEventKind::FrameDecoded => "frame_decoded",
            PipelineEventKind::NetworkLost => "network_lost",
            PipelineEventKind::DecodeError { .. } => "decode_error",
            PipelineEventKind::ConnectFailed { .. } => "connect_failed",
            PipelineEventKind::LayerChanged { .. } => "layer_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEvent {
    pub stream_id: StreamId,
    pub kind: PipelineEventKind,
}

/// Sending half of the pipeline event channel.
#[derive(Debug, Clone)]
pub struct PipelineEventSink {
    sender: mpsc::Sender<PipelineEvent>,
}

impl PipelineEventSink {
    /// Create a sink and the receiver the player manager consumes.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }

    /// Deliver an event. Returns `false` once the player has shut down.
    pub async fn emit(&self, stream_id: StreamId, kind: PipelineEventKind) -> bool {
        self.sender
            .send(PipelineEvent { stream_id, kind })
            .await
            .is_ok()
    }

    /// Deliver an event without waiting for channel capacity.
    pub fn try_emit(&self, stream_id: StreamId, kind: PipelineEventKind) -> bool {
        self.sender
            .try_send(PipelineEvent { stream_id, kind })
            .is_ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Commands the player issues to the media pipeline.
#[async_trait::async_trait]
pub trait MediaPipeline: Send + Sync {
    /// Begin connecting a stream. Completion arrives as a
    /// [`PipelineEventKind::Connected`] or [`PipelineEventKind::ConnectFailed`]
    /// event.
    async fn connect(&self, request: ConnectRequest) -> Result<(), PipelineError>;

    /// Tear down a stream, cancelling any in-flight connect.
    async fn disconnect(&self, stream_id: &StreamId) -> Result<(), PipelineError>;

    async fn set_key(&self, stream_id: &StreamId, key: &DecryptionKey)
        -> Result<(), PipelineError>;

    async fn set_volume(&self, stream_id: &StreamId, volume: u32) -> Result<(), PipelineError>;

    async fn set_audio_muted(&self, stream_id: &StreamId, muted: bool)
        -> Result<(), PipelineError>;

    async fn set_video_muted(&self, stream_id: &StreamId, muted: bool)
        -> Result<(), PipelineError>;

    async fn switch_layer(&self, stream_id: &StreamId, layer: VideoLayer)
        -> Result<(), PipelineError>;

    /// Swap the render target of a live stream.
    async fn rebind_canvas(
        &self,
        stream_id: &StreamId,
        canvas: Option<&Canvas>,
    ) -> Result<(), PipelineError>;

    /// Capture the next decodable frame as an encoded image.
    async fn request_snapshot(&self, stream_id: &StreamId) -> Result<Bytes, PipelineError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (sink, mut rx) = PipelineEventSink::channel(8);
        let id = StreamId::parse("cam1").unwrap();

        assert!(sink.emit(id.clone(), PipelineEventKind::Connected { svc: true }).await);
        assert!(sink.try_emit(id.clone(), PipelineEventKind::NetworkLost));

        assert_eq!(
            rx.recv().await.unwrap().kind,
            PipelineEventKind::Connected { svc: true }
        );
        assert_eq!(rx.recv().await.unwrap().kind, PipelineEventKind::NetworkLost);
    }

    #[tokio::test]
    async fn test_sink_reports_closed_receiver() {
        let (sink, rx) = PipelineEventSink::channel(1);
        drop(rx);
        assert!(sink.is_closed());
        assert!(
            !sink
                .emit(StreamId::parse("cam1").unwrap(), PipelineEventKind::FrameDecoded)
                .await
        );
    }

    #[test]
    fn test_event_labels() {
        assert_eq!(
            PipelineEventKind::DecodeError {
                reason: "bad nal".to_string()
            }
            .as_str(),
            "decode_error"
        );
        assert_eq!(
            PipelineEventKind::LayerChanged {
                layer: VideoLayer::Base
            }
            .as_str(),
            "layer_changed"
        );
    }
}

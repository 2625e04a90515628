//! In-process pipeline that "plays" streams without any media.
//!
//! Used by the `stream-player` binary and by unit tests. Connects succeed
//! after a configurable latency while the loopback is reachable; snapshots
//! return a small generated PPM image for connected streams.

use super::{ConnectRequest, MediaPipeline, PipelineError, PipelineEventKind, PipelineEventSink};
use crate::keys::DecryptionKey;
use crate::layer::VideoLayer;
use crate::types::Canvas;
use bytes::{BufMut, Bytes, BytesMut};
use common::types::StreamId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const SNAPSHOT_WIDTH: u8 = 4;
const SNAPSHOT_HEIGHT: u8 = 4;

/// What the loopback knows about one open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackStream {
    pub canvas: Option<Canvas>,
    pub layer: VideoLayer,
    pub volume: u32,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub key_len: Option<usize>,
    pub hardware_decode: bool,
    pub connected: bool,
}

#[derive(Debug, Clone)]
pub struct LoopbackPipeline {
    sink: PipelineEventSink,
    streams: Arc<RwLock<HashMap<StreamId, LoopbackStream>>>,
    reachable: Arc<AtomicBool>,
    svc: bool,
    latency: Duration,
}

impl LoopbackPipeline {
    #[must_use]
    pub fn new(sink: PipelineEventSink) -> Self {
        Self {
            sink,
            streams: Arc::new(RwLock::new(HashMap::new())),
            reachable: Arc::new(AtomicBool::new(true)),
            svc: true,
            latency: Duration::from_millis(50),
        }
    }

    /// Whether publishers advertise SVC layers.
    #[must_use]
    pub fn with_svc(mut self, svc: bool) -> Self {
        self.svc = svc;
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Drop a connected stream as if the network went away.
    pub async fn simulate_network_loss(&self, stream_id: &StreamId) {
        if let Some(stream) = self.streams.write().await.get_mut(stream_id) {
            stream.connected = false;
        }
        self.sink
            .emit(stream_id.clone(), PipelineEventKind::NetworkLost)
            .await;
    }

    /// Current view of a stream, if open.
    pub async fn stream(&self, stream_id: &StreamId) -> Option<LoopbackStream> {
        self.streams.read().await.get(stream_id).cloned()
    }

    async fn update<F>(&self, stream_id: &StreamId, f: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut LoopbackStream),
    {
        let mut streams = self.streams.write().await;
        let stream = streams
            .get_mut(stream_id)
            .ok_or(PipelineError::NotConnected)?;
        f(stream);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MediaPipeline for LoopbackPipeline {
    async fn connect(&self, request: ConnectRequest) -> Result<(), PipelineError> {
        let stream_id = request.stream_id.clone();
        let reachable = self.reachable.load(Ordering::SeqCst);

        debug!(
            target: "player.pipeline.loopback",
            stream_id = %stream_id,
            attempt = request.attempt,
            reachable = reachable,
            "Loopback connect"
        );

        self.streams.write().await.insert(
            stream_id.clone(),
            LoopbackStream {
                canvas: request.canvas,
                layer: request.layer,
                volume: request.volume,
                audio_muted: request.audio_muted,
                video_muted: request.video_muted,
                key_len: request.key.as_ref().map(|k| k.len()),
                hardware_decode: request.decoder.hardware_decode,
                connected: false,
            },
        );

        let sink = self.sink.clone();
        let streams = Arc::clone(&self.streams);
        let latency = self.latency;
        let svc = self.svc;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let kind = if reachable {
                match streams.write().await.get_mut(&stream_id) {
                    Some(stream) => stream.connected = true,
                    // Disconnected while the connect was in flight
                    None => return,
                }
                PipelineEventKind::Connected { svc }
            } else {
                PipelineEventKind::ConnectFailed {
                    reason: "loopback unreachable".to_string(),
                }
            };
            sink.emit(stream_id, kind).await;
        });

        Ok(())
    }

    async fn disconnect(&self, stream_id: &StreamId) -> Result<(), PipelineError> {
        self.streams.write().await.remove(stream_id);
        Ok(())
    }

    async fn set_key(
        &self,
        stream_id: &StreamId,
        key: &DecryptionKey,
    ) -> Result<(), PipelineError> {
        let len = key.len();
        self.update(stream_id, |s| s.key_len = Some(len)).await
    }

    async fn set_volume(&self, stream_id: &StreamId, volume: u32) -> Result<(), PipelineError> {
        self.update(stream_id, |s| s.volume = volume).await
    }

    async fn set_audio_muted(
        &self,
        stream_id: &StreamId,
        muted: bool,
    ) -> Result<(), PipelineError> {
        self.update(stream_id, |s| s.audio_muted = muted).await
    }

    async fn set_video_muted(
        &self,
        stream_id: &StreamId,
        muted: bool,
    ) -> Result<(), PipelineError> {
        self.update(stream_id, |s| s.video_muted = muted).await
    }

    async fn switch_layer(
        &self,
        stream_id: &StreamId,
        layer: VideoLayer,
    ) -> Result<(), PipelineError> {
        self.update(stream_id, |s| s.layer = layer).await
    }

    async fn rebind_canvas(
        &self,
        stream_id: &StreamId,
        canvas: Option<&Canvas>,
    ) -> Result<(), PipelineError> {
        let canvas = canvas.cloned();
        self.update(stream_id, |s| s.canvas = canvas).await
    }

    async fn request_snapshot(&self, stream_id: &StreamId) -> Result<Bytes, PipelineError> {
        let streams = self.streams.read().await;
        match streams.get(stream_id) {
            Some(stream) if stream.connected && !stream.video_muted => Ok(test_pattern()),
            Some(_) => Err(PipelineError::NoFrame),
            None => Err(PipelineError::NotConnected),
        }
    }
}

/// Binary PPM of a small gradient.
fn test_pattern() -> Bytes {
    let header = format!("P6\n{SNAPSHOT_WIDTH} {SNAPSHOT_HEIGHT}\n255\n");
    let mut buf = BytesMut::with_capacity(
        header.len() + usize::from(SNAPSHOT_WIDTH) * usize::from(SNAPSHOT_HEIGHT) * 3,
    );
    buf.put_slice(header.as_bytes());
    for y in 0..SNAPSHOT_HEIGHT {
        for x in 0..SNAPSHOT_WIDTH {
            buf.put_u8(x.saturating_mul(64));
            buf.put_u8(y.saturating_mul(64));
            buf.put_u8(128);
        }
    }
    buf.freeze()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::decoder::DecoderSettings;
    use crate::types::ResourceMode;

    fn request(id: &StreamId) -> ConnectRequest {
        ConnectRequest {
            stream_id: id.clone(),
            canvas: Some(Canvas::new("view-1")),
            layer: VideoLayer::Auto,
            decoder: DecoderSettings::default(),
            key: None,
            volume: 100,
            audio_muted: false,
            video_muted: false,
            resource_mode: ResourceMode::Default,
            cdn_url: None,
            attempt: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_emits_connected() {
        let (sink, mut events) = PipelineEventSink::channel(8);
        let pipeline = LoopbackPipeline::new(sink).with_svc(false);
        let id = StreamId::parse("cam1").unwrap();

        pipeline.connect(request(&id)).await.unwrap();
        let event = events.recv().await.unwrap();

        assert_eq!(event.stream_id, id);
        assert_eq!(event.kind, PipelineEventKind::Connected { svc: false });
        assert!(pipeline.stream(&id).await.unwrap().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_emits_connect_failed() {
        let (sink, mut events) = PipelineEventSink::channel(8);
        let pipeline = LoopbackPipeline::new(sink);
        pipeline.set_reachable(false);
        let id = StreamId::parse("cam1").unwrap();

        pipeline.connect(request(&id)).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap().kind,
            PipelineEventKind::ConnectFailed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_requires_connection() {
        let (sink, mut events) = PipelineEventSink::channel(8);
        let pipeline = LoopbackPipeline::new(sink);
        let id = StreamId::parse("cam1").unwrap();

        assert_eq!(
            pipeline.request_snapshot(&id).await,
            Err(PipelineError::NotConnected)
        );

        pipeline.connect(request(&id)).await.unwrap();
        events.recv().await.unwrap();

        let image = pipeline.request_snapshot(&id).await.unwrap();
        assert!(image.starts_with(b"P6\n4 4\n255\n"));
        assert_eq!(image.len(), 11 + 4 * 4 * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_update_stream() {
        let (sink, _events) = PipelineEventSink::channel(8);
        let pipeline = LoopbackPipeline::new(sink);
        let id = StreamId::parse("cam1").unwrap();

        assert_eq!(
            pipeline.set_volume(&id, 50).await,
            Err(PipelineError::NotConnected)
        );

        pipeline.connect(request(&id)).await.unwrap();
        pipeline.set_volume(&id, 150).await.unwrap();
        pipeline.set_audio_muted(&id, true).await.unwrap();
        pipeline.switch_layer(&id, VideoLayer::Base).await.unwrap();
        pipeline.rebind_canvas(&id, None).await.unwrap();

        let stream = pipeline.stream(&id).await.unwrap();
        assert_eq!(stream.volume, 150);
        assert!(stream.audio_muted);
        assert_eq!(stream.layer, VideoLayer::Base);
        assert_eq!(stream.canvas, None);

        pipeline.disconnect(&id).await.unwrap();
        assert!(pipeline.stream(&id).await.is_none());
    }
}

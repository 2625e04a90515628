//! `PlaybackSessionActor` - per-stream playback state machine.
//!
//! Each session actor:
//! - Owns the mutable state of one stream (volume, mute flags, layer, canvas)
//! - Drives connect, retry and give-up through its own timers
//! - Issues commands to the shared media pipeline
//! - Emits a `StateUpdate` for every transition
//!
//! # State machine
//!
//! ```text
//! Connecting ──connected──▶ Playing ──loss──▶ Interrupted ──▶ Reconnecting
//!     │                        ▲                                  │    │
//!     └──attempt failed────────┼──────────────────────────────────┘    │
//!                              └────────────connected──────────────────┤
//!                                                             ceiling ▼
//!                                                                  GivenUp
//! any ──cancel──▶ Stopped
//! ```
//!
//! Messages, pipeline events and timers are all handled on the actor task,
//! so transitions for one stream are strictly serialized.

use super::messages::{PendingPreferences, SessionInfo, SessionMessage};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::decoder::DecoderSettings;
use crate::errors::{PlayerError, SUCCESS_CODE};
use crate::keys::DecryptionKeyStore;
use crate::layer::{LayerSelector, SvcCapability, VideoLayer};
use crate::observability::metrics as prom;
use crate::pipeline::{ConnectRequest, MediaPipeline, PipelineError, PipelineEventKind};
use crate::reconnect::{ReconnectPolicy, ReconnectionController, RetryDecision};
use crate::types::{Canvas, PlaybackConfig, SessionState, Snapshot, StateUpdate};
use common::types::StreamId;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for session mailboxes.
const SESSION_CHANNEL_BUFFER: usize = 256;

/// Default playback volume.
pub const DEFAULT_VOLUME: u32 = 100;

/// Largest accepted playback volume.
pub const MAX_VOLUME: u32 = 200;

/// Everything a new session starts from.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub stream_id: StreamId,
    pub canvas: Option<Canvas>,
    pub config: PlaybackConfig,
    pub decoder: DecoderSettings,
    pub preferences: PendingPreferences,
    pub policy: ReconnectPolicy,
    pub snapshot_timeout: Duration,
}

/// Shared collaborators handed to every session.
#[derive(Clone)]
pub struct SessionContext {
    pub pipeline: Arc<dyn MediaPipeline>,
    pub keys: DecryptionKeyStore,
    pub events: broadcast::Sender<StateUpdate>,
    pub metrics: Arc<ActorMetrics>,
}

/// Handle to a `PlaybackSessionActor`.
#[derive(Debug, Clone)]
pub struct PlaybackSessionHandle {
    stream_id: StreamId,
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl PlaybackSessionHandle {
    #[must_use]
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    async fn send(&self, message: SessionMessage) -> Result<(), PlayerError> {
        self.mailbox.record_enqueue();
        if self.sender.send(message).await.is_err() {
            self.mailbox.record_dequeue();
            return Err(PlayerError::SessionNotFound(self.stream_id.clone()));
        }
        Ok(())
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, PlayerError> {
        let (tx, rx) = oneshot::channel();
        self.send(message(tx)).await?;
        rx.await
            .map_err(|_| PlayerError::SessionNotFound(self.stream_id.clone()))
    }

    /// Repeated start: rebind the canvas, or restart a session that gave up.
    pub async fn start(
        &self,
        canvas: Option<Canvas>,
        decoder: DecoderSettings,
    ) -> Result<(), PlayerError> {
        self.request(|respond_to| SessionMessage::Start {
            canvas,
            decoder,
            respond_to,
        })
        .await
    }

    pub async fn set_volume(&self, volume: u32) -> Result<(), PlayerError> {
        self.request(|respond_to| SessionMessage::SetVolume { volume, respond_to })
            .await
    }

    pub async fn mute_audio(&self, muted: bool) -> Result<(), PlayerError> {
        self.request(|respond_to| SessionMessage::MuteAudio { muted, respond_to })
            .await
    }

    pub async fn mute_video(&self, muted: bool) -> Result<(), PlayerError> {
        self.request(|respond_to| SessionMessage::MuteVideo { muted, respond_to })
            .await
    }

    pub async fn set_layer(&self, layer: VideoLayer) -> Result<(), PlayerError> {
        self.request(|respond_to| SessionMessage::SetLayer { layer, respond_to })
            .await
    }

    /// Tell the session the key store holds a newer key.
    pub async fn key_updated(&self) -> Result<(), PlayerError> {
        self.request(|respond_to| SessionMessage::KeyUpdated { respond_to })
            .await
    }

    pub async fn take_snapshot(&self) -> Result<Snapshot, PlayerError> {
        self.request(|respond_to| SessionMessage::TakeSnapshot { respond_to })
            .await
    }

    pub async fn info(&self) -> Result<SessionInfo, PlayerError> {
        self.request(|respond_to| SessionMessage::GetInfo { respond_to })
            .await
    }

    /// Hand a message to the session without waiting for mailbox capacity.
    fn forward(&self, message: SessionMessage) -> Forwarded {
        self.mailbox.record_enqueue();
        match self.sender.try_send(message) {
            Ok(()) => Forwarded::Delivered,
            Err(e) => {
                self.mailbox.record_dequeue();
                match e {
                    TrySendError::Full(_) => Forwarded::Full,
                    TrySendError::Closed(_) => Forwarded::Closed,
                }
            }
        }
    }

    /// Forward a pipeline event (no reply, never waits).
    pub fn forward_pipeline_event(&self, kind: PipelineEventKind) -> Forwarded {
        self.forward(SessionMessage::Pipeline { kind })
    }

    pub fn forward_publisher_available(&self) -> Forwarded {
        self.forward(SessionMessage::PublisherAvailable)
    }

    pub fn forward_publisher_gone(&self) -> Forwarded {
        self.forward(SessionMessage::PublisherGone)
    }

    /// Tear the session down.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn mailbox_depth(&self) -> usize {
        self.mailbox.current_depth()
    }
}

/// Result of a non-blocking forward into a session mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarded {
    Delivered,
    /// Mailbox at capacity; the message was dropped.
    Full,
    /// Session already stopped.
    Closed,
}

/// Settings the pipeline currently holds for this stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AppliedSettings {
    volume: u32,
    audio_muted: bool,
    video_muted: bool,
    layer: VideoLayer,
    key_version: u64,
}

/// The `PlaybackSessionActor` implementation.
pub struct PlaybackSessionActor {
    stream_id: StreamId,
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    ctx: SessionContext,
    mailbox: Arc<MailboxMonitor>,

    state: SessionState,
    canvas: Option<Canvas>,
    config: PlaybackConfig,
    decoder: DecoderSettings,
    volume: u32,
    audio_muted: bool,
    video_muted: bool,
    layers: LayerSelector,
    reconnect: ReconnectionController,
    snapshot_timeout: Duration,
    applied: AppliedSettings,

    /// Timeout of the connect attempt in flight.
    attempt_deadline: Option<Instant>,
    /// Next scheduled retry.
    retry_at: Option<Instant>,
    /// Give-up instant of the current outage.
    give_up_at: Option<Instant>,
}

impl PlaybackSessionActor {
    /// Spawn a new session actor and begin connecting.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        params: SessionParams,
        ctx: SessionContext,
        cancel_token: CancellationToken,
    ) -> (PlaybackSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Session,
            params.stream_id.as_str(),
        ));

        let prefs = params.preferences;
        let requested_layer = prefs.layer.unwrap_or(params.config.video_layer);

        let actor = Self {
            stream_id: params.stream_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            ctx,
            mailbox: Arc::clone(&mailbox),
            state: SessionState::Connecting,
            canvas: params.canvas,
            config: params.config,
            decoder: params.decoder,
            volume: DEFAULT_VOLUME,
            audio_muted: prefs.audio_muted.unwrap_or(false),
            video_muted: prefs.video_muted.unwrap_or(false),
            layers: LayerSelector::new(requested_layer),
            reconnect: ReconnectionController::new(params.policy),
            snapshot_timeout: params.snapshot_timeout,
            applied: AppliedSettings {
                volume: DEFAULT_VOLUME,
                audio_muted: false,
                video_muted: false,
                layer: requested_layer,
                key_version: 0,
            },
            attempt_deadline: None,
            retry_at: None,
            give_up_at: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = PlaybackSessionHandle {
            stream_id: params.stream_id,
            sender,
            cancel_token,
            mailbox,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "player.actor.session", fields(stream_id = %self.stream_id))]
    async fn run(mut self) {
        info!(
            target: "player.actor.session",
            stream_id = %self.stream_id,
            "PlaybackSessionActor started"
        );

        self.transition(SessionState::Connecting, SUCCESS_CODE, serde_json::Value::Null);
        self.connect().await;

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    self.teardown().await;
                    break;
                }

                () = sleep_until_opt(self.give_up_at) => {
                    self.give_up().await;
                }

                () = sleep_until_opt(self.attempt_deadline) => {
                    self.on_attempt_timeout().await;
                }

                () = sleep_until_opt(self.retry_at) => {
                    self.retry_at = None;
                    self.connect().await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.ctx.metrics.record_message_processed();
                        }
                        None => {
                            debug!(
                                target: "player.actor.session",
                                stream_id = %self.stream_id,
                                "PlaybackSessionActor channel closed, exiting"
                            );
                            self.teardown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "player.actor.session",
            stream_id = %self.stream_id,
            messages_processed = self.mailbox.messages_processed(),
            "PlaybackSessionActor stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Start {
                canvas,
                decoder,
                respond_to,
            } => {
                self.handle_start(canvas, decoder).await;
                let _ = respond_to.send(());
            }

            SessionMessage::SetVolume { volume, respond_to } => {
                self.volume = volume.min(MAX_VOLUME);
                self.sync_if_playing().await;
                let _ = respond_to.send(());
            }

            SessionMessage::MuteAudio { muted, respond_to } => {
                self.audio_muted = muted;
                self.sync_if_playing().await;
                let _ = respond_to.send(());
            }

            SessionMessage::MuteVideo { muted, respond_to } => {
                self.video_muted = muted;
                self.sync_if_playing().await;
                let _ = respond_to.send(());
            }

            SessionMessage::SetLayer { layer, respond_to } => {
                match self.layers.request(layer) {
                    Some(effective) => debug!(
                        target: "player.actor.session",
                        stream_id = %self.stream_id,
                        requested = layer.as_str(),
                        effective = effective.as_str(),
                        "Layer switch requested"
                    ),
                    None => debug!(
                        target: "player.actor.session",
                        stream_id = %self.stream_id,
                        requested = layer.as_str(),
                        "Layer request stored without switch"
                    ),
                }
                self.sync_if_playing().await;
                let _ = respond_to.send(());
            }

            SessionMessage::KeyUpdated { respond_to } => {
                self.sync_if_playing().await;
                let _ = respond_to.send(());
            }

            SessionMessage::TakeSnapshot { respond_to } => {
                self.spawn_snapshot(respond_to);
            }

            SessionMessage::Pipeline { kind } => {
                self.handle_pipeline_event(kind).await;
            }

            SessionMessage::PublisherAvailable => {
                if self.state == SessionState::Reconnecting && self.retry_at.take().is_some() {
                    debug!(
                        target: "player.actor.session",
                        stream_id = %self.stream_id,
                        "Publisher available, retrying immediately"
                    );
                    self.connect().await;
                }
            }

            SessionMessage::PublisherGone => {
                let err = PlayerError::Pipeline(PipelineError::Network(
                    "publisher removed".to_string(),
                ));
                self.on_connection_lost(&err).await;
            }

            SessionMessage::GetInfo { respond_to } => {
                let info = self.info().await;
                let _ = respond_to.send(info);
            }
        }
    }

    async fn handle_pipeline_event(&mut self, kind: PipelineEventKind) {
        debug!(
            target: "player.actor.session",
            stream_id = %self.stream_id,
            event = kind.as_str(),
            state = self.state.as_str(),
            "Pipeline event"
        );

        match kind {
            PipelineEventKind::Connected { svc } => {
                self.on_connected(Some(SvcCapability::from_svc_flag(svc)))
                    .await;
            }
            PipelineEventKind::FrameDecoded => {
                if self.state != SessionState::Playing {
                    self.on_connected(None).await;
                }
            }
            PipelineEventKind::NetworkLost => {
                let err = PlayerError::Pipeline(PipelineError::Network("network lost".to_string()));
                self.on_connection_lost(&err).await;
            }
            PipelineEventKind::DecodeError { reason } => {
                let err = PlayerError::Pipeline(PipelineError::Decode(reason));
                self.on_connection_lost(&err).await;
            }
            PipelineEventKind::ConnectFailed { reason } => {
                if self.attempt_deadline.is_some() {
                    self.on_attempt_failed(&reason).await;
                }
            }
            PipelineEventKind::LayerChanged { layer } => {
                if self.layers.on_heuristic_switch(layer) {
                    debug!(
                        target: "player.actor.session",
                        stream_id = %self.stream_id,
                        layer = layer.as_str(),
                        "Pipeline switched layer automatically"
                    );
                }
            }
        }
    }

    /// Repeated start on a live session.
    async fn handle_start(&mut self, canvas: Option<Canvas>, decoder: DecoderSettings) {
        if self.state == SessionState::GivenUp {
            info!(
                target: "player.actor.session",
                stream_id = %self.stream_id,
                "Restarting session after give-up"
            );
            self.canvas = canvas;
            self.decoder = decoder;
            self.reconnect.reset();
            self.transition(SessionState::Connecting, SUCCESS_CODE, serde_json::Value::Null);
            self.connect().await;
            return;
        }

        if self.canvas == canvas {
            return;
        }
        self.canvas = canvas;

        if self.state == SessionState::Playing || self.attempt_deadline.is_some() {
            let result = self
                .ctx
                .pipeline
                .rebind_canvas(&self.stream_id, self.canvas.as_ref())
                .await;
            self.log_command("rebind_canvas", result);
        }
    }

    /// Issue a connect attempt with the current settings.
    async fn connect(&mut self) {
        let attempt = if self.reconnect.is_active() {
            prom::record_reconnect_attempt();
            self.reconnect.record_attempt()
        } else {
            0
        };

        let key = self.ctx.keys.get(&self.stream_id).await;
        let request = ConnectRequest {
            stream_id: self.stream_id.clone(),
            canvas: self.canvas.clone(),
            layer: self.layers.requested(),
            decoder: self.decoder,
            key: key.as_ref().map(|r| Arc::clone(&r.key)),
            volume: self.volume,
            audio_muted: self.audio_muted,
            video_muted: self.video_muted,
            resource_mode: self.config.resource_mode,
            cdn_url: self.config.cdn_url.clone(),
            attempt,
        };

        self.applied = AppliedSettings {
            volume: self.volume,
            audio_muted: self.audio_muted,
            video_muted: self.video_muted,
            layer: self.layers.requested(),
            key_version: key.map_or(0, |r| r.version),
        };

        debug!(
            target: "player.actor.session",
            stream_id = %self.stream_id,
            attempt = attempt,
            "Connecting"
        );

        match self.ctx.pipeline.connect(request).await {
            Ok(()) => {
                self.attempt_deadline =
                    Some(Instant::now() + self.reconnect.policy().attempt_timeout);
            }
            Err(e) => {
                self.on_attempt_failed(&e.to_string()).await;
            }
        }
    }

    async fn on_connected(&mut self, capability: Option<SvcCapability>) {
        // Only an attempt in flight can complete
        if !self.state.is_connecting() || self.attempt_deadline.is_none() {
            if let (SessionState::Playing, Some(c)) = (self.state, capability) {
                if self.layers.capability() != Some(c) {
                    let effective = self.layers.on_connected(c);
                    debug!(
                        target: "player.actor.session",
                        stream_id = %self.stream_id,
                        effective = effective.as_str(),
                        "Publisher capability learned while playing"
                    );
                    self.sync_settings().await;
                }
            }
            return;
        }

        let now = Instant::now();
        let recovered = self.reconnect.is_active();
        let elapsed = self.reconnect.elapsed(now);
        let attempts = self.reconnect.attempts();

        self.reconnect.reset();
        self.attempt_deadline = None;
        self.retry_at = None;
        self.give_up_at = None;

        // A first decoded frame does not say whether the publisher uses SVC;
        // the capability stays unknown until the pipeline reports it
        let effective = capability
            .or(self.layers.capability())
            .map(|c| self.layers.on_connected(c));

        if recovered {
            prom::record_reconnect_recovery(elapsed);
            info!(
                target: "player.reconnect",
                stream_id = %self.stream_id,
                attempts = attempts,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "Stream recovered"
            );
        }

        self.transition(
            SessionState::Playing,
            SUCCESS_CODE,
            json!({
                "effective_layer": effective.map(|l| l.as_str()),
                "reconnect_attempts": attempts,
            }),
        );
        self.sync_settings().await;
    }

    async fn on_connection_lost(&mut self, reason: &PlayerError) {
        match self.state {
            SessionState::Playing => {
                let now = Instant::now();
                self.transition(
                    SessionState::Interrupted,
                    reason.error_code(),
                    json!({ "reason": reason.to_string() }),
                );
                self.give_up_at = Some(self.reconnect.begin(now));
                self.transition(
                    SessionState::Reconnecting,
                    reason.error_code(),
                    serde_json::Value::Null,
                );
                self.schedule_retry(now).await;
            }
            SessionState::Connecting | SessionState::Reconnecting
                if self.attempt_deadline.is_some() =>
            {
                self.on_attempt_failed(&reason.to_string()).await;
            }
            _ => {}
        }
    }

    async fn on_attempt_timeout(&mut self) {
        self.attempt_deadline = None;
        debug!(
            target: "player.reconnect",
            stream_id = %self.stream_id,
            "Connect attempt timed out"
        );
        // Cancel the attempt in flight before scheduling the next one
        let result = self.ctx.pipeline.disconnect(&self.stream_id).await;
        self.log_command("disconnect", result);
        self.on_attempt_failed("attempt timed out").await;
    }

    async fn on_attempt_failed(&mut self, reason: &str) {
        self.attempt_deadline = None;
        let now = Instant::now();

        match self.state {
            SessionState::Connecting => {
                // First failure starts the outage clock
                self.give_up_at = Some(self.reconnect.begin(now));
                let err = PlayerError::ConnectFailed(reason.to_string());
                self.transition(
                    SessionState::Reconnecting,
                    err.error_code(),
                    json!({ "reason": reason }),
                );
            }
            SessionState::Reconnecting => {
                debug!(
                    target: "player.reconnect",
                    stream_id = %self.stream_id,
                    attempts = self.reconnect.attempts(),
                    reason = %reason,
                    "Reconnect attempt failed"
                );
            }
            _ => return,
        }

        self.schedule_retry(now).await;
    }

    async fn schedule_retry(&mut self, now: Instant) {
        match self.reconnect.next_delay(now) {
            RetryDecision::RetryAfter(delay) => self.retry_at = Some(now + delay),
            RetryDecision::GiveUp => self.give_up().await,
        }
    }

    async fn give_up(&mut self) {
        if self.state != SessionState::Reconnecting {
            self.give_up_at = None;
            return;
        }

        let elapsed = self.reconnect.elapsed(Instant::now());
        self.give_up_at = None;
        self.retry_at = None;
        self.attempt_deadline = None;

        let result = self.ctx.pipeline.disconnect(&self.stream_id).await;
        self.log_command("disconnect", result);

        prom::record_reconnect_given_up();
        warn!(
            target: "player.reconnect",
            stream_id = %self.stream_id,
            attempts = self.reconnect.attempts(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Reconnect ceiling reached, giving up"
        );

        self.transition(
            SessionState::GivenUp,
            PlayerError::ReconnectExhausted.error_code(),
            json!({
                "attempts": self.reconnect.attempts(),
                "elapsed_ms": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            }),
        );
    }

    async fn teardown(&mut self) {
        self.attempt_deadline = None;
        self.retry_at = None;
        self.give_up_at = None;

        let result = self.ctx.pipeline.disconnect(&self.stream_id).await;
        self.log_command("disconnect", result);

        self.transition(SessionState::Stopped, SUCCESS_CODE, serde_json::Value::Null);
    }

    async fn sync_if_playing(&mut self) {
        if self.state == SessionState::Playing {
            self.sync_settings().await;
        }
    }

    /// Push every setting that differs from what the pipeline holds.
    async fn sync_settings(&mut self) {
        let pipeline = Arc::clone(&self.ctx.pipeline);
        let id = &self.stream_id;

        if self.applied.volume != self.volume {
            let result = pipeline.set_volume(id, self.volume).await;
            if self.log_command("set_volume", result) {
                self.applied.volume = self.volume;
            }
        }

        if self.applied.audio_muted != self.audio_muted {
            let result = pipeline.set_audio_muted(id, self.audio_muted).await;
            if self.log_command("set_audio_muted", result) {
                self.applied.audio_muted = self.audio_muted;
            }
        }

        if self.applied.video_muted != self.video_muted {
            let result = pipeline.set_video_muted(id, self.video_muted).await;
            if self.log_command("set_video_muted", result) {
                self.applied.video_muted = self.video_muted;
            }
        }

        if self.layers.capability() == Some(SvcCapability::SvcEnabled) {
            if let Some(effective) = self.layers.effective() {
                if effective != self.applied.layer {
                    let result = pipeline.switch_layer(id, effective).await;
                    if self.log_command("switch_layer", result) {
                        self.applied.layer = effective;
                    }
                }
            }
        }

        if let Some(record) = self.ctx.keys.get(id).await {
            if record.version != self.applied.key_version {
                let result = pipeline.set_key(id, &record.key).await;
                if self.log_command("set_key", result) {
                    self.applied.key_version = record.version;
                    debug!(
                        target: "player.keys",
                        stream_id = %self.stream_id,
                        version = record.version,
                        "Decryption key propagated"
                    );
                }
            }
        }
    }

    fn spawn_snapshot(&self, respond_to: oneshot::Sender<Snapshot>) {
        let pipeline = Arc::clone(&self.ctx.pipeline);
        let stream_id = self.stream_id.clone();
        let timeout = self.snapshot_timeout;

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = tokio::time::timeout(timeout, pipeline.request_snapshot(&stream_id)).await;

            let snapshot = match outcome {
                Ok(Ok(image)) if !image.is_empty() => Snapshot::captured(image),
                Ok(Ok(_)) => snapshot_failed(&stream_id, "empty frame"),
                Ok(Err(e)) => snapshot_failed(&stream_id, &e.to_string()),
                Err(_) => snapshot_failed(&stream_id, "timed out waiting for frame"),
            };

            prom::record_snapshot(snapshot.is_ok(), started.elapsed());
            let _ = respond_to.send(snapshot);
        });
    }

    async fn info(&self) -> SessionInfo {
        SessionInfo {
            stream_id: self.stream_id.clone(),
            state: self.state,
            volume: self.volume,
            audio_muted: self.audio_muted,
            video_muted: self.video_muted,
            requested_layer: self.layers.requested(),
            effective_layer: self.layers.effective(),
            svc_capability: self.layers.capability(),
            reconnect_attempts: self.reconnect.attempts(),
            reconnect_elapsed: self.reconnect.elapsed(Instant::now()),
            key_version: self.ctx.keys.version(&self.stream_id).await,
            decoder: self.decoder,
            canvas: self.canvas.clone(),
            config: self.config.clone(),
        }
    }

    fn transition(&mut self, state: SessionState, error_code: i32, extra_info: serde_json::Value) {
        let previous = self.state;
        self.state = state;
        prom::record_state_transition(state.as_str());

        info!(
            target: "player.actor.session",
            stream_id = %self.stream_id,
            from = previous.as_str(),
            to = state.as_str(),
            error_code = error_code,
            "Session state changed"
        );

        // No subscribers is fine
        let _ = self.ctx.events.send(
            StateUpdate::new(self.stream_id.clone(), state)
                .with_error(error_code)
                .with_info(extra_info),
        );
    }

    /// Log a failed pipeline command. Returns whether it succeeded.
    fn log_command(&self, command: &'static str, result: Result<(), PipelineError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    target: "player.actor.session",
                    stream_id = %self.stream_id,
                    command = command,
                    error = %e,
                    "Pipeline command failed"
                );
                false
            }
        }
    }
}

fn snapshot_failed(stream_id: &StreamId, reason: &str) -> Snapshot {
    let err = PlayerError::SnapshotFailed(reason.to_string());
    debug!(
        target: "player.actor.session",
        stream_id = %stream_id,
        reason = %reason,
        "Snapshot failed"
    );
    Snapshot::failed(err.error_code())
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::{LoopbackPipeline, PipelineEventSink};

    struct Harness {
        handle: PlaybackSessionHandle,
        task: JoinHandle<()>,
        pipeline: Arc<LoopbackPipeline>,
        updates: broadcast::Receiver<StateUpdate>,
        id: StreamId,
    }

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(4),
            multiplier: 2.0,
            jitter: 0.0,
            ceiling: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(2),
        }
    }

    fn spawn_session(prefs: PendingPreferences, reachable: bool) -> Harness {
        let (sink, mut pipeline_events) = PipelineEventSink::channel(64);
        let pipeline = Arc::new(LoopbackPipeline::new(sink).with_svc(true));
        pipeline.set_reachable(reachable);

        let (events, updates) = broadcast::channel(64);
        let id = StreamId::parse("cam1").unwrap();
        let ctx = SessionContext {
            pipeline: Arc::clone(&pipeline) as Arc<dyn MediaPipeline>,
            keys: DecryptionKeyStore::new(),
            events,
            metrics: ActorMetrics::new(),
        };
        let params = SessionParams {
            stream_id: id.clone(),
            canvas: Some(Canvas::new("view-1")),
            config: PlaybackConfig::default(),
            decoder: DecoderSettings::default(),
            preferences: prefs,
            policy: policy(),
            snapshot_timeout: Duration::from_secs(1),
        };
        let (handle, task) = PlaybackSessionActor::spawn(params, ctx, CancellationToken::new());

        let router = handle.clone();
        tokio::spawn(async move {
            while let Some(event) = pipeline_events.recv().await {
                let _ = router.forward_pipeline_event(event.kind);
            }
        });

        Harness {
            handle,
            task,
            pipeline,
            updates,
            id,
        }
    }

    async fn next_state(updates: &mut broadcast::Receiver<StateUpdate>) -> StateUpdate {
        updates.recv().await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_to_playing_with_defaults() {
        let mut h = spawn_session(PendingPreferences::default(), true);

        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Connecting);
        let playing = next_state(&mut h.updates).await;
        assert_eq!(playing.state, SessionState::Playing);
        assert_eq!(playing.error_code, SUCCESS_CODE);

        let info = h.handle.info().await.unwrap();
        assert_eq!(info.volume, DEFAULT_VOLUME);
        assert!(!info.audio_muted);
        assert!(!info.video_muted);
        assert_eq!(info.requested_layer, VideoLayer::Auto);
        assert_eq!(info.svc_capability, Some(SvcCapability::SvcEnabled));

        h.handle.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_preferences_applied_at_connect() {
        let prefs = PendingPreferences {
            audio_muted: Some(true),
            video_muted: None,
            layer: Some(VideoLayer::Base),
        };
        let mut h = spawn_session(prefs, true);
        next_state(&mut h.updates).await;
        next_state(&mut h.updates).await;

        let stream = h.pipeline.stream(&h.id).await.unwrap();
        assert!(stream.audio_muted);
        assert_eq!(stream.layer, VideoLayer::Base);

        h.handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_pushed_while_playing() {
        let mut h = spawn_session(PendingPreferences::default(), true);
        next_state(&mut h.updates).await;
        next_state(&mut h.updates).await;

        h.handle.set_volume(150).await.unwrap();
        h.handle.mute_video(true).await.unwrap();
        h.handle.set_layer(VideoLayer::Standard).await.unwrap();

        let stream = h.pipeline.stream(&h.id).await.unwrap();
        assert_eq!(stream.volume, 150);
        assert!(stream.video_muted);
        assert_eq!(stream.layer, VideoLayer::Standard);

        h.handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_survive_reconnect() {
        let mut h = spawn_session(PendingPreferences::default(), true);
        next_state(&mut h.updates).await;
        next_state(&mut h.updates).await;

        h.handle.set_volume(42).await.unwrap();
        h.handle.mute_audio(true).await.unwrap();
        h.handle.set_layer(VideoLayer::Base).await.unwrap();

        h.pipeline.simulate_network_loss(&h.id).await;

        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Interrupted);
        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Reconnecting);
        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Playing);

        let info = h.handle.info().await.unwrap();
        assert_eq!(info.volume, 42);
        assert!(info.audio_muted);
        assert_eq!(info.requested_layer, VideoLayer::Base);
        assert_eq!(info.reconnect_attempts, 0);

        let stream = h.pipeline.stream(&h.id).await.unwrap();
        assert_eq!(stream.volume, 42);
        assert!(stream.audio_muted);
        assert_eq!(stream.layer, VideoLayer::Base);

        h.handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_ceiling() {
        let mut h = spawn_session(PendingPreferences::default(), false);
        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Connecting);

        let reconnecting = next_state(&mut h.updates).await;
        assert_eq!(reconnecting.state, SessionState::Reconnecting);
        assert_eq!(
            reconnecting.error_code,
            PlayerError::ConnectFailed(String::new()).error_code()
        );
        let outage_start = Instant::now();

        let given_up = next_state(&mut h.updates).await;
        assert_eq!(given_up.state, SessionState::GivenUp);
        assert_eq!(
            given_up.error_code,
            PlayerError::ReconnectExhausted.error_code()
        );

        let elapsed = Instant::now() - outage_start;
        assert!(elapsed >= policy().ceiling, "gave up early: {elapsed:?}");
        assert!(
            elapsed <= policy().ceiling + policy().max_interval,
            "gave up late: {elapsed:?}"
        );

        // Still addressable after giving up
        h.handle.set_volume(10).await.unwrap();
        assert_eq!(h.handle.info().await.unwrap().volume, 10);

        h.handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_give_up_restarts() {
        let mut h = spawn_session(PendingPreferences::default(), false);
        loop {
            if next_state(&mut h.updates).await.state == SessionState::GivenUp {
                break;
            }
        }

        h.handle.mute_audio(true).await.unwrap();
        h.pipeline.set_reachable(true);
        h.handle
            .start(None, DecoderSettings::default().with_hardware_decode(true))
            .await
            .unwrap();

        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Connecting);
        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Playing);

        let info = h.handle.info().await.unwrap();
        assert!(info.decoder.hardware_decode);
        assert!(info.audio_muted);
        assert_eq!(info.canvas, None);

        h.handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_start_rebinds_canvas_only() {
        let mut h = spawn_session(PendingPreferences::default(), true);
        next_state(&mut h.updates).await;
        next_state(&mut h.updates).await;
        h.handle.set_volume(77).await.unwrap();

        h.handle
            .start(
                Some(Canvas::new("view-2")),
                DecoderSettings::default().with_hardware_decode(true),
            )
            .await
            .unwrap();

        let info = h.handle.info().await.unwrap();
        assert_eq!(info.state, SessionState::Playing);
        assert_eq!(info.volume, 77);
        assert!(!info.decoder.hardware_decode);
        assert_eq!(info.canvas, Some(Canvas::new("view-2")));

        let stream = h.pipeline.stream(&h.id).await.unwrap();
        assert_eq!(stream.canvas, Some(Canvas::new("view-2")));
        assert!(h.updates.try_recv().is_err(), "no state change expected");

        h.handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_does_not_change_state() {
        let mut h = spawn_session(PendingPreferences::default(), true);
        next_state(&mut h.updates).await;
        next_state(&mut h.updates).await;

        let snapshot = h.handle.take_snapshot().await.unwrap();
        assert!(snapshot.is_ok());
        assert!(!snapshot.image.is_empty());
        assert_eq!(h.handle.info().await.unwrap().state, SessionState::Playing);
        assert!(h.updates.try_recv().is_err());

        h.handle.mute_video(true).await.unwrap();
        let snapshot = h.handle.take_snapshot().await.unwrap();
        assert_eq!(
            snapshot.error_code,
            PlayerError::SnapshotFailed(String::new()).error_code()
        );
        assert!(snapshot.image.is_empty());

        h.handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_emits_stopped_and_releases_pipeline() {
        let mut h = spawn_session(PendingPreferences::default(), true);
        next_state(&mut h.updates).await;
        next_state(&mut h.updates).await;

        h.handle.cancel();
        h.task.await.unwrap();

        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Stopped);
        assert!(h.pipeline.stream(&h.id).await.is_none());
        assert!(matches!(
            h.handle.info().await,
            Err(PlayerError::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_reconnecting_leaves_no_timers() {
        let mut h = spawn_session(PendingPreferences::default(), false);
        next_state(&mut h.updates).await;
        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Reconnecting);

        h.handle.cancel();
        h.task.await.unwrap();
        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Stopped);

        // Nothing fires after teardown
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(matches!(
            h.updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publisher_available_skips_backoff() {
        let mut h = spawn_session(PendingPreferences::default(), true);
        next_state(&mut h.updates).await;
        next_state(&mut h.updates).await;

        assert_eq!(h.handle.forward_publisher_gone(), Forwarded::Delivered);
        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Interrupted);
        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Reconnecting);

        let before = Instant::now();
        assert_eq!(h.handle.forward_publisher_available(), Forwarded::Delivered);
        assert_eq!(next_state(&mut h.updates).await.state, SessionState::Playing);
        // Only the loopback latency elapsed, not the 1s backoff
        assert!(Instant::now() - before < Duration::from_secs(1));

        h.handle.cancel();
    }
}

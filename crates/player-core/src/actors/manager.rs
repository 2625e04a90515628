//! `PlayerManagerActor` - singleton registry of playback sessions.
//!
//! The `PlayerManagerActor` is the top-level actor of the player:
//!
//! - Singleton per process
//! - Maps `StreamId` to exactly one `PlaybackSessionActor`
//! - Owns global decoder settings and pending per-stream preferences
//! - Routes pipeline events to the session they belong to
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! Per-session operations only use the manager for the registry lookup and
//! are then sent straight to the session, so a busy session never stalls
//! the registry.
//!
//! # Graceful Shutdown
//!
//! On shutdown, the manager:
//! 1. Sets `accepting_new = false`
//! 2. Cancels every session (each emits `Stopped`)
//! 3. Waits, bounded, for the session tasks to finish

use super::messages::{
    ManagerMessage, ManagerStatus, PendingPreference, PendingPreferences, SessionInfo,
    StartOutcome,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::session::{
    Forwarded, PlaybackSessionActor, PlaybackSessionHandle, SessionContext, SessionParams,
    MAX_VOLUME,
};
use crate::config::Config;
use crate::decoder::DecoderSettings;
use crate::errors::PlayerError;
use crate::keys::{DecryptionKey, DecryptionKeyStore};
use crate::layer::VideoLayer;
use crate::observability::metrics as prom;
use crate::pipeline::{MediaPipeline, PipelineEvent};
use crate::types::{Canvas, PlaybackConfig, Snapshot, StateUpdate};

use chrono::{DateTime, Utc};
use common::types::StreamId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the manager mailbox.
const MANAGER_CHANNEL_BUFFER: usize = 1000;

/// Buffer of the state-update broadcast channel.
const STATE_UPDATE_BUFFER: usize = 1024;

/// Bound on waiting for one session to tear down after stop.
const SESSION_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the `PlayerManagerActor`.
///
/// This is the public operation surface of the player. Every method is
/// async and returns once the request has been accepted; connection
/// progress is reported through [`PlayerManagerHandle::subscribe`].
#[derive(Clone)]
pub struct PlayerManagerHandle {
    sender: mpsc::Sender<ManagerMessage>,
    cancel_token: CancellationToken,
    keys: DecryptionKeyStore,
    events: broadcast::Sender<StateUpdate>,
    mailbox: Arc<MailboxMonitor>,
}

impl PlayerManagerHandle {
    /// Create a new `PlayerManagerActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated player configuration
    /// * `pipeline` - Media pipeline shared by every session
    /// * `pipeline_events` - Receiving end of the pipeline's event sink
    #[must_use]
    pub fn new(
        config: Config,
        pipeline: Arc<dyn MediaPipeline>,
        pipeline_events: mpsc::Receiver<PipelineEvent>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(MANAGER_CHANNEL_BUFFER);
        let (events, _) = broadcast::channel(STATE_UPDATE_BUFFER);
        let cancel_token = CancellationToken::new();
        let keys = DecryptionKeyStore::new();
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Manager,
            config.instance_id.clone(),
        ));

        let actor = PlayerManagerActor {
            decoder: config.initial_decoder_settings,
            config,
            receiver,
            pipeline_events,
            cancel_token: cancel_token.clone(),
            sessions: HashMap::new(),
            pending: HashMap::new(),
            accepting_new: true,
            metrics: ActorMetrics::new(),
            mailbox: Arc::clone(&mailbox),
            pipeline,
            keys: keys.clone(),
            events: events.clone(),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            keys,
            events,
            mailbox,
        }
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> ManagerMessage,
    ) -> Result<T, PlayerError> {
        if self.is_cancelled() {
            return Err(PlayerError::ShuttingDown);
        }

        let (tx, rx) = oneshot::channel();
        self.mailbox.record_enqueue();
        self.sender.send(message(tx)).await.map_err(|e| {
            self.mailbox.record_dequeue();
            self.closed_error(format!("channel send failed: {e}"))
        })?;

        rx.await
            .map_err(|e| self.closed_error(format!("response receive failed: {e}")))
    }

    async fn notify(&self, message: ManagerMessage) -> Result<(), PlayerError> {
        if self.is_cancelled() {
            return Err(PlayerError::ShuttingDown);
        }

        self.mailbox.record_enqueue();
        self.sender.send(message).await.map_err(|e| {
            self.mailbox.record_dequeue();
            self.closed_error(format!("channel send failed: {e}"))
        })
    }

    /// A closed manager channel after cancellation is a normal shutdown.
    fn closed_error(&self, detail: String) -> PlayerError {
        if self.is_cancelled() {
            PlayerError::ShuttingDown
        } else {
            PlayerError::Internal(detail)
        }
    }

    async fn route(
        &self,
        stream_id: &StreamId,
        pending: Option<PendingPreference>,
    ) -> Result<Option<PlaybackSessionHandle>, PlayerError> {
        self.request(|respond_to| ManagerMessage::Route {
            stream_id: stream_id.clone(),
            pending,
            respond_to,
        })
        .await
    }

    /// Start playing a stream, or rebind the canvas of an existing session.
    pub async fn start_playing_stream(
        &self,
        stream_id: &str,
        canvas: Option<Canvas>,
        config: Option<PlaybackConfig>,
    ) -> Result<(), PlayerError> {
        observe(self.start(stream_id, canvas, config).await)
    }

    /// Stop a stream. Succeeds without effect when no session exists.
    pub async fn stop_playing_stream(&self, stream_id: &str) -> Result<(), PlayerError> {
        observe(self.stop(stream_id).await)
    }

    /// Store a decryption key, propagating it to a live session.
    ///
    /// The key may be set before the stream is started. An invalid key
    /// leaves any previous key in place.
    pub async fn set_play_stream_decryption_key(
        &self,
        stream_id: &str,
        key: Vec<u8>,
    ) -> Result<(), PlayerError> {
        observe(self.set_key(stream_id, key).await)
    }

    /// Capture one decoded frame.
    ///
    /// Capture failures are reported in [`Snapshot::error_code`]; only a
    /// missing session is an error.
    pub async fn take_play_stream_snapshot(&self, stream_id: &str) -> Result<Snapshot, PlayerError> {
        observe(self.snapshot(stream_id).await)
    }

    /// Set volume on one stream, or on every active session when
    /// `stream_id` is `None` or empty.
    pub async fn set_play_volume(
        &self,
        stream_id: Option<&str>,
        volume: u32,
    ) -> Result<(), PlayerError> {
        let volume = if volume > MAX_VOLUME {
            warn!(
                target: "player.actor.manager",
                requested = volume,
                applied = MAX_VOLUME,
                "Volume out of range, clamping"
            );
            MAX_VOLUME
        } else {
            volume
        };

        match stream_id.filter(|id| !id.is_empty()) {
            Some(id) => observe(self.set_stream_volume(id, volume).await),
            None => observe(self.broadcast_volume(volume).await),
        }
    }

    /// Request a video layer, stored as a preference if not yet started.
    pub async fn set_play_stream_video_layer(
        &self,
        stream_id: &str,
        layer: VideoLayer,
    ) -> Result<(), PlayerError> {
        observe(
            self.apply_preference(stream_id, PendingPreference::Layer(layer))
                .await,
        )
    }

    pub async fn mute_play_stream_audio(&self, stream_id: &str, muted: bool) -> Result<(), PlayerError> {
        observe(
            self.apply_preference(stream_id, PendingPreference::AudioMuted(muted))
                .await,
        )
    }

    pub async fn mute_play_stream_video(&self, stream_id: &str, muted: bool) -> Result<(), PlayerError> {
        observe(
            self.apply_preference(stream_id, PendingPreference::VideoMuted(muted))
                .await,
        )
    }

    /// Applies to sessions started (or restarted) after this call.
    pub async fn enable_hardware_decoder(&self, enable: bool) -> Result<DecoderSettings, PlayerError> {
        observe(
            self.request(|respond_to| ManagerMessage::UpdateDecoder {
                hardware_decode: Some(enable),
                check_poc: None,
                respond_to,
            })
            .await,
        )
    }

    /// Applies to sessions started (or restarted) after this call.
    pub async fn enable_check_poc(&self, enable: bool) -> Result<DecoderSettings, PlayerError> {
        observe(
            self.request(|respond_to| ManagerMessage::UpdateDecoder {
                hardware_decode: None,
                check_poc: Some(enable),
                respond_to,
            })
            .await,
        )
    }

    /// Room Service notification: the publisher of `stream_id` is available.
    pub async fn stream_added(&self, stream_id: &str) -> Result<(), PlayerError> {
        let stream_id = observe(StreamId::parse(stream_id).map_err(PlayerError::from))?;
        self.notify(ManagerMessage::StreamAdded { stream_id }).await
    }

    /// Room Service notification: the publisher of `stream_id` went away.
    pub async fn stream_removed(&self, stream_id: &str) -> Result<(), PlayerError> {
        let stream_id = observe(StreamId::parse(stream_id).map_err(PlayerError::from))?;
        self.notify(ManagerMessage::StreamRemoved { stream_id }).await
    }

    /// Room logout: stop every session and forget all keys and preferences.
    pub async fn logout(&self) -> Result<(), PlayerError> {
        let tasks = self
            .request(|respond_to| ManagerMessage::Logout { respond_to })
            .await?;
        for task in tasks {
            if let Err(e) = tokio::time::timeout(SESSION_STOP_TIMEOUT, task).await {
                warn!(
                    target: "player.actor.manager",
                    error = %e,
                    "Session teardown timed out during logout"
                );
            }
        }
        Ok(())
    }

    pub async fn session_info(&self, stream_id: &str) -> Result<SessionInfo, PlayerError> {
        observe(self.info(stream_id).await)
    }

    pub async fn status(&self) -> Result<ManagerStatus, PlayerError> {
        self.request(|respond_to| ManagerMessage::GetStatus { respond_to })
            .await
    }

    /// Receive every state update emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.events.subscribe()
    }

    /// Initiate graceful shutdown. Returns at once if already shut down.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), PlayerError> {
        if self.is_cancelled() {
            return Ok(());
        }
        self.request(|respond_to| ManagerMessage::Shutdown {
            deadline,
            respond_to,
        })
        .await?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn start(
        &self,
        stream_id: &str,
        canvas: Option<Canvas>,
        config: Option<PlaybackConfig>,
    ) -> Result<(), PlayerError> {
        let stream_id = StreamId::parse(stream_id)?;
        let outcome = self
            .request(|respond_to| ManagerMessage::Start {
                stream_id,
                canvas: canvas.clone(),
                config: config.unwrap_or_default(),
                respond_to,
            })
            .await??;

        match outcome {
            StartOutcome::Created => Ok(()),
            StartOutcome::Existing { session, decoder } => session.start(canvas, decoder).await,
        }
    }

    async fn stop(&self, stream_id: &str) -> Result<(), PlayerError> {
        let stream_id = StreamId::parse(stream_id)?;
        let task = self
            .request(|respond_to| ManagerMessage::Stop {
                stream_id: stream_id.clone(),
                respond_to,
            })
            .await?;

        if let Some(task) = task {
            await_teardown(&stream_id, task).await;
        }
        Ok(())
    }

    async fn set_key(&self, stream_id: &str, key: Vec<u8>) -> Result<(), PlayerError> {
        let stream_id = StreamId::parse(stream_id)?;
        let key = DecryptionKey::new(key)?;
        // The store outlives the actor; nothing may land in it after shutdown
        if self.is_cancelled() {
            return Err(PlayerError::ShuttingDown);
        }
        self.keys.insert(&stream_id, key).await;

        if let Some(session) = self.route(&stream_id, None).await? {
            session.key_updated().await?;
        }
        Ok(())
    }

    async fn set_stream_volume(&self, stream_id: &str, volume: u32) -> Result<(), PlayerError> {
        let stream_id = StreamId::parse(stream_id)?;
        let session = self.existing_session(&stream_id).await?;
        session.set_volume(volume).await
    }

    async fn broadcast_volume(&self, volume: u32) -> Result<(), PlayerError> {
        let sessions = self
            .request(|respond_to| ManagerMessage::ListSessions { respond_to })
            .await?;
        for session in sessions {
            // A session stopped mid-broadcast is simply skipped
            if let Err(e) = session.set_volume(volume).await {
                debug!(
                    target: "player.actor.manager",
                    stream_id = %session.stream_id(),
                    error = %e,
                    "Skipping session during volume broadcast"
                );
            }
        }
        Ok(())
    }

    /// Forward a preference to the session, or keep it for the next start.
    async fn apply_preference(
        &self,
        stream_id: &str,
        preference: PendingPreference,
    ) -> Result<(), PlayerError> {
        let stream_id = StreamId::parse(stream_id)?;
        let Some(session) = self.route(&stream_id, Some(preference)).await? else {
            return Ok(());
        };
        match preference {
            PendingPreference::AudioMuted(muted) => session.mute_audio(muted).await,
            PendingPreference::VideoMuted(muted) => session.mute_video(muted).await,
            PendingPreference::Layer(layer) => session.set_layer(layer).await,
        }
    }

    async fn snapshot(&self, stream_id: &str) -> Result<Snapshot, PlayerError> {
        let stream_id = StreamId::parse(stream_id)?;
        self.existing_session(&stream_id).await?.take_snapshot().await
    }

    async fn info(&self, stream_id: &str) -> Result<SessionInfo, PlayerError> {
        let stream_id = StreamId::parse(stream_id)?;
        self.existing_session(&stream_id).await?.info().await
    }

    async fn existing_session(
        &self,
        stream_id: &StreamId,
    ) -> Result<PlaybackSessionHandle, PlayerError> {
        self.route(stream_id, None)
            .await?
            .ok_or_else(|| PlayerError::SessionNotFound(stream_id.clone()))
    }
}

/// Count an error returned to the caller.
fn observe<T>(result: Result<T, PlayerError>) -> Result<T, PlayerError> {
    if let Err(e) = &result {
        prom::record_error(e.error_type_label());
    }
    result
}

async fn await_teardown(stream_id: &StreamId, task: JoinHandle<()>) {
    match tokio::time::timeout(SESSION_STOP_TIMEOUT, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            target: "player.actor.manager",
            stream_id = %stream_id,
            error = ?e,
            "Session task failed during stop"
        ),
        Err(_) => warn!(
            target: "player.actor.manager",
            stream_id = %stream_id,
            "Session teardown timed out"
        ),
    }
}

/// Internal state for a managed session.
struct ManagedSession {
    handle: PlaybackSessionHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
    created_at: DateTime<Utc>,
}

/// The `PlayerManagerActor` implementation.
pub struct PlayerManagerActor {
    config: Config,
    receiver: mpsc::Receiver<ManagerMessage>,
    pipeline_events: mpsc::Receiver<PipelineEvent>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    sessions: HashMap<StreamId, ManagedSession>,
    /// Preferences set before a stream was started.
    pending: HashMap<StreamId, PendingPreferences>,
    decoder: DecoderSettings,
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
    pipeline: Arc<dyn MediaPipeline>,
    keys: DecryptionKeyStore,
    events: broadcast::Sender<StateUpdate>,
}

impl PlayerManagerActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "player.actor.manager", fields(instance_id = %self.config.instance_id))]
    async fn run(mut self) {
        info!(
            target: "player.actor.manager",
            instance_id = %self.config.instance_id,
            "PlayerManagerActor started"
        );

        loop {
            self.check_session_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "player.actor.manager",
                        instance_id = %self.config.instance_id,
                        "PlayerManagerActor received cancellation signal"
                    );
                    self.graceful_shutdown(SESSION_STOP_TIMEOUT).await;
                    break;
                }

                Some(event) = self.pipeline_events.recv() => {
                    self.route_pipeline_event(event);
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "player.actor.manager",
                                instance_id = %self.config.instance_id,
                                "PlayerManagerActor channel closed, exiting"
                            );
                            self.graceful_shutdown(SESSION_STOP_TIMEOUT).await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "player.actor.manager",
            instance_id = %self.config.instance_id,
            sessions_remaining = self.sessions.len(),
            messages_processed = self.mailbox.messages_processed(),
            "PlayerManagerActor stopped"
        );
    }

    async fn handle_message(&mut self, message: ManagerMessage) {
        match message {
            ManagerMessage::Start {
                stream_id,
                canvas,
                config,
                respond_to,
            } => {
                let result = self.start_session(stream_id, canvas, config);
                let _ = respond_to.send(result);
            }

            ManagerMessage::Stop {
                stream_id,
                respond_to,
            } => {
                // Preferences stored before start never outlive a stop
                if self.pending.remove(&stream_id).is_some() {
                    debug!(
                        target: "player.actor.manager",
                        stream_id = %stream_id,
                        "Pending preferences cleared by stop"
                    );
                }
                let task = self.remove_session(&stream_id).await;
                let _ = respond_to.send(task);
            }

            ManagerMessage::Route {
                stream_id,
                pending,
                respond_to,
            } => {
                let session = self.sessions.get(&stream_id).map(|s| s.handle.clone());
                if let (None, Some(pref)) = (&session, pending) {
                    if self.accepting_new {
                        debug!(
                            target: "player.actor.manager",
                            stream_id = %stream_id,
                            preference = ?pref,
                            "Storing preference for stream not yet started"
                        );
                        self.pending.entry(stream_id).or_default().apply(pref);
                    }
                }
                let _ = respond_to.send(session);
            }

            ManagerMessage::ListSessions { respond_to } => {
                let sessions = self.sessions.values().map(|s| s.handle.clone()).collect();
                let _ = respond_to.send(sessions);
            }

            ManagerMessage::UpdateDecoder {
                hardware_decode,
                check_poc,
                respond_to,
            } => {
                if let Some(enable) = hardware_decode {
                    self.decoder = self.decoder.with_hardware_decode(enable);
                }
                if let Some(enable) = check_poc {
                    self.decoder = self.decoder.with_check_poc(enable);
                }
                info!(
                    target: "player.actor.manager",
                    hardware_decode = self.decoder.hardware_decode,
                    check_poc = self.decoder.check_poc,
                    "Decoder settings updated"
                );
                let _ = respond_to.send(self.decoder);
            }

            ManagerMessage::StreamAdded { stream_id } => {
                if let Some(managed) = self.sessions.get(&stream_id) {
                    let outcome = managed.handle.forward_publisher_available();
                    self.observe_forward(&stream_id, "stream_added", outcome);
                }
            }

            ManagerMessage::StreamRemoved { stream_id } => {
                if let Some(managed) = self.sessions.get(&stream_id) {
                    let outcome = managed.handle.forward_publisher_gone();
                    self.observe_forward(&stream_id, "stream_removed", outcome);
                }
            }

            ManagerMessage::Logout { respond_to } => {
                let tasks = self.logout().await;
                let _ = respond_to.send(tasks);
            }

            ManagerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ManagerMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                self.graceful_shutdown(deadline).await;
                // Cancel before replying so the caller observes it on return
                self.cancel_token.cancel();
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    fn start_session(
        &mut self,
        stream_id: StreamId,
        canvas: Option<Canvas>,
        config: PlaybackConfig,
    ) -> Result<StartOutcome, PlayerError> {
        if let Some(managed) = self.sessions.get(&stream_id) {
            debug!(
                target: "player.actor.manager",
                stream_id = %stream_id,
                "Session exists, forwarding start"
            );
            return Ok(StartOutcome::Existing {
                session: managed.handle.clone(),
                decoder: self.decoder,
            });
        }

        if !self.accepting_new {
            return Err(PlayerError::ShuttingDown);
        }

        if self.sessions.len() >= self.config.max_sessions {
            warn!(
                target: "player.actor.manager",
                stream_id = %stream_id,
                limit = self.config.max_sessions,
                "Session capacity reached"
            );
            return Err(PlayerError::CapacityExceeded {
                limit: self.config.max_sessions,
            });
        }

        let params = SessionParams {
            stream_id: stream_id.clone(),
            canvas,
            config,
            decoder: self.decoder,
            preferences: self.pending.remove(&stream_id).unwrap_or_default(),
            policy: self.config.reconnect_policy(),
            snapshot_timeout: self.config.snapshot_timeout,
        };
        let ctx = SessionContext {
            pipeline: Arc::clone(&self.pipeline),
            keys: self.keys.clone(),
            events: self.events.clone(),
            metrics: Arc::clone(&self.metrics),
        };

        let (handle, task_handle) =
            PlaybackSessionActor::spawn(params, ctx, self.cancel_token.child_token());

        self.sessions.insert(
            stream_id.clone(),
            ManagedSession {
                handle,
                task_handle,
                created_at: Utc::now(),
            },
        );
        self.metrics.session_created();

        info!(
            target: "player.actor.manager",
            stream_id = %stream_id,
            total_sessions = self.sessions.len(),
            "Session created"
        );

        Ok(StartOutcome::Created)
    }

    /// Destroy a session and everything scoped to it.
    async fn remove_session(&mut self, stream_id: &StreamId) -> Option<JoinHandle<()>> {
        let managed = self.sessions.remove(stream_id)?;

        managed.handle.cancel();
        self.pending.remove(stream_id);
        self.keys.remove(stream_id).await;
        self.metrics.session_removed();

        info!(
            target: "player.actor.manager",
            stream_id = %stream_id,
            lifetime_secs = (Utc::now() - managed.created_at).num_seconds(),
            remaining_sessions = self.sessions.len(),
            "Session removed"
        );

        Some(managed.task_handle)
    }

    async fn logout(&mut self) -> Vec<JoinHandle<()>> {
        info!(
            target: "player.actor.manager",
            session_count = self.sessions.len(),
            "Logging out, stopping every session"
        );

        let ids: Vec<StreamId> = self.sessions.keys().cloned().collect();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.remove_session(&id).await {
                tasks.push(task);
            }
        }

        self.pending.clear();
        self.keys.clear().await;
        tasks
    }

    /// Hand a pipeline event to its session.
    ///
    /// Never waits on the session mailbox: the session may itself be waiting
    /// on a pipeline call that needs this loop to drain the event sink.
    fn route_pipeline_event(&self, event: PipelineEvent) {
        let label = event.kind.as_str();
        match self.sessions.get(&event.stream_id) {
            Some(managed) => {
                let outcome = managed.handle.forward_pipeline_event(event.kind);
                self.observe_forward(&event.stream_id, label, outcome);
            }
            None => debug!(
                target: "player.actor.manager",
                stream_id = %event.stream_id,
                event = label,
                "Pipeline event for unknown stream ignored"
            ),
        }
    }

    fn observe_forward(&self, stream_id: &StreamId, event: &'static str, outcome: Forwarded) {
        match outcome {
            Forwarded::Delivered => {}
            Forwarded::Full => self.metrics.record_event_dropped(stream_id.as_str(), event),
            Forwarded::Closed => debug!(
                target: "player.actor.manager",
                stream_id = %stream_id,
                event = event,
                "Event for stopping session dropped"
            ),
        }
    }

    fn get_status(&self) -> ManagerStatus {
        ManagerStatus {
            instance_id: self.config.instance_id.clone(),
            session_count: self.sessions.len(),
            pending_preferences: self.pending.len(),
            decoder: self.decoder,
            is_shutting_down: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
            events_dropped: self.metrics.events_dropped(),
        }
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self, deadline: Duration) {
        if !self.accepting_new && self.sessions.is_empty() {
            return;
        }

        info!(
            target: "player.actor.manager",
            instance_id = %self.config.instance_id,
            session_count = self.sessions.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        for managed in self.sessions.values() {
            managed.handle.cancel();
        }

        for (stream_id, managed) in self.sessions.drain() {
            match tokio::time::timeout(deadline, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "player.actor.manager",
                        stream_id = %stream_id,
                        "Session actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "player.actor.manager",
                        stream_id = %stream_id,
                        error = ?e,
                        "Session actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "player.actor.manager",
                        stream_id = %stream_id,
                        "Session actor shutdown timed out"
                    );
                }
            }
            self.metrics.session_removed();
        }

        self.pending.clear();
        self.keys.clear().await;

        info!(
            target: "player.actor.manager",
            instance_id = %self.config.instance_id,
            "Graceful shutdown complete"
        );
    }

    /// Check health of managed session actors.
    async fn check_session_health(&mut self) {
        let finished: Vec<StreamId> = self
            .sessions
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for stream_id in finished {
            let Some(managed) = self.sessions.remove(&stream_id) else {
                continue;
            };

            warn!(
                target: "player.actor.manager",
                stream_id = %stream_id,
                "Session actor task finished unexpectedly"
            );

            if let Err(join_error) = managed.task_handle.await {
                if join_error.is_panic() {
                    error!(
                        target: "player.actor.manager",
                        stream_id = %stream_id,
                        error = ?join_error,
                        "Session actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Session);
                }
            }

            self.keys.remove(&stream_id).await;
            self.metrics.session_removed();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::{LoopbackPipeline, PipelineEventSink, PIPELINE_EVENT_BUFFER};
    use crate::types::SessionState;

    fn manager_with(config: Config) -> (PlayerManagerHandle, Arc<LoopbackPipeline>) {
        let (sink, pipeline_events) = PipelineEventSink::channel(PIPELINE_EVENT_BUFFER);
        let pipeline = Arc::new(LoopbackPipeline::new(sink));
        let handle = PlayerManagerHandle::new(
            config,
            Arc::clone(&pipeline) as Arc<dyn MediaPipeline>,
            pipeline_events,
        );
        (handle, pipeline)
    }

    fn manager() -> (PlayerManagerHandle, Arc<LoopbackPipeline>) {
        manager_with(Config {
            instance_id: "player-test".to_string(),
            ..Config::default()
        })
    }

    async fn wait_for(
        updates: &mut broadcast::Receiver<StateUpdate>,
        id: &str,
        state: SessionState,
    ) -> StateUpdate {
        loop {
            let update = updates.recv().await.unwrap();
            if update.stream_id.as_str() == id && update.state == state {
                return update;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_emits_connecting_then_playing() {
        let (manager, _) = manager();
        let mut updates = manager.subscribe();

        manager.start_playing_stream("cam1", None, None).await.unwrap();

        let first = updates.recv().await.unwrap();
        assert_eq!(first.state, SessionState::Connecting);
        wait_for(&mut updates, "cam1", SessionState::Playing).await;

        assert_eq!(manager.status().await.unwrap().session_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_stream_id_rejected() {
        let (manager, _) = manager();

        let err = manager
            .start_playing_stream("bad id!", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::InvalidStreamId(_)));
        assert_eq!(manager.status().await.unwrap().session_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (manager, pipeline) = manager();
        let mut updates = manager.subscribe();

        manager.start_playing_stream("cam1", None, None).await.unwrap();
        wait_for(&mut updates, "cam1", SessionState::Playing).await;

        manager.stop_playing_stream("cam1").await.unwrap();
        wait_for(&mut updates, "cam1", SessionState::Stopped).await;
        manager.stop_playing_stream("cam1").await.unwrap();

        let id = StreamId::parse("cam1").unwrap();
        assert!(pipeline.stream(&id).await.is_none());
        assert_eq!(manager.status().await.unwrap().session_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_key() {
        let (manager, _) = manager();
        let mut updates = manager.subscribe();

        manager
            .set_play_stream_decryption_key("cam1", vec![1u8; 16])
            .await
            .unwrap();
        manager.start_playing_stream("cam1", None, None).await.unwrap();
        wait_for(&mut updates, "cam1", SessionState::Playing).await;
        assert_eq!(manager.session_info("cam1").await.unwrap().key_version, 1);

        manager.stop_playing_stream("cam1").await.unwrap();
        manager.start_playing_stream("cam1", None, None).await.unwrap();
        assert_eq!(manager.session_info("cam1").await.unwrap().key_version, 0);
    }

    #[tokio::test]
    async fn test_unknown_stream_volume_and_snapshot_fail() {
        let (manager, _) = manager();

        assert!(matches!(
            manager.set_play_volume(Some("ghost"), 50).await,
            Err(PlayerError::SessionNotFound(_))
        ));
        assert!(matches!(
            manager.take_play_stream_snapshot("ghost").await,
            Err(PlayerError::SessionNotFound(_))
        ));
        // Broadcast with no sessions is fine
        manager.set_play_volume(None, 50).await.unwrap();
        manager.set_play_volume(Some(""), 50).await.unwrap();
    }

    #[tokio::test]
    async fn test_preferences_before_start_are_pending() {
        let (manager, _) = manager();

        manager.mute_play_stream_video("cam1", true).await.unwrap();
        manager
            .set_play_stream_video_layer("cam1", VideoLayer::Base)
            .await
            .unwrap();
        assert_eq!(manager.status().await.unwrap().pending_preferences, 1);

        manager.start_playing_stream("cam1", None, None).await.unwrap();
        let info = manager.session_info("cam1").await.unwrap();
        assert!(info.video_muted);
        assert_eq!(info.requested_layer, VideoLayer::Base);
        assert_eq!(manager.status().await.unwrap().pending_preferences, 0);
    }

    #[tokio::test]
    async fn test_decoder_settings_apply_to_new_sessions() {
        let (manager, _) = manager();

        manager.start_playing_stream("old", None, None).await.unwrap();
        let settings = manager.enable_hardware_decoder(true).await.unwrap();
        assert!(settings.hardware_decode);
        let settings = manager.enable_check_poc(false).await.unwrap();
        assert!(!settings.check_poc);
        manager.start_playing_stream("new", None, None).await.unwrap();

        let old = manager.session_info("old").await.unwrap();
        let new = manager.session_info("new").await.unwrap();
        assert_eq!(old.decoder, DecoderSettings::default());
        assert!(new.decoder.hardware_decode);
        assert!(!new.decoder.check_poc);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let (manager, _) = manager_with(Config {
            max_sessions: 1,
            ..Config::default()
        });

        manager.start_playing_stream("a", None, None).await.unwrap();
        let err = manager.start_playing_stream("b", None, None).await.unwrap_err();
        assert!(matches!(err, PlayerError::CapacityExceeded { limit: 1 }));
        // Existing session is still reachable
        manager.start_playing_stream("a", None, None).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sessions_and_rejects_new() {
        let (manager, _) = manager();
        let mut updates = manager.subscribe();

        manager.start_playing_stream("cam1", None, None).await.unwrap();
        manager.shutdown(Duration::from_secs(5)).await.unwrap();
        wait_for(&mut updates, "cam1", SessionState::Stopped).await;

        assert!(manager.is_cancelled());
        assert!(manager.start_playing_stream("cam2", None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_cancellation_token() {
        let (manager, _) = manager();
        assert!(!manager.is_cancelled());
        manager.cancel();
        assert!(manager.is_cancelled());
    }
}

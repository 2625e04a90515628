//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Request/reply uses `tokio::sync::oneshot`.

use super::session::PlaybackSessionHandle;
use crate::decoder::DecoderSettings;
use crate::errors::PlayerError;
use crate::layer::{SvcCapability, VideoLayer};
use crate::pipeline::PipelineEventKind;
use crate::types::{Canvas, PlaybackConfig, SessionState, Snapshot};
use common::types::StreamId;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Messages sent to `PlayerManagerActor`.
#[derive(Debug)]
pub enum ManagerMessage {
    /// Create a session, or hand back the existing one.
    Start {
        stream_id: StreamId,
        canvas: Option<Canvas>,
        config: PlaybackConfig,
        respond_to: oneshot::Sender<Result<StartOutcome, PlayerError>>,
    },

    /// Remove a session and its key/preferences.
    Stop {
        stream_id: StreamId,
        /// The removed session's task, for the caller to await teardown.
        respond_to: oneshot::Sender<Option<JoinHandle<()>>>,
    },

    /// Look up a session. With no session and `pending` set, the preference
    /// is stored for the next start instead.
    Route {
        stream_id: StreamId,
        pending: Option<PendingPreference>,
        respond_to: oneshot::Sender<Option<PlaybackSessionHandle>>,
    },

    /// Handles of every live session.
    ListSessions {
        respond_to: oneshot::Sender<Vec<PlaybackSessionHandle>>,
    },

    /// Update a global decoder flag for future sessions.
    UpdateDecoder {
        hardware_decode: Option<bool>,
        check_poc: Option<bool>,
        respond_to: oneshot::Sender<DecoderSettings>,
    },

    /// Room Service: the publisher (re)appeared.
    StreamAdded { stream_id: StreamId },

    /// Room Service: the publisher went away.
    StreamRemoved { stream_id: StreamId },

    /// Stop every session and clear all per-stream state.
    Logout {
        respond_to: oneshot::Sender<Vec<JoinHandle<()>>>,
    },

    GetStatus {
        respond_to: oneshot::Sender<ManagerStatus>,
    },

    /// Stop accepting sessions and cancel everything.
    Shutdown {
        /// Bound on waiting for each session to tear down.
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), PlayerError>>,
    },
}

/// Reply to a start request.
#[derive(Debug)]
pub enum StartOutcome {
    /// A new session was spawned.
    Created,
    /// A session already exists; the caller forwards the start to it.
    Existing {
        session: PlaybackSessionHandle,
        decoder: DecoderSettings,
    },
}

/// Preference recorded for a stream that has no session yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingPreference {
    AudioMuted(bool),
    VideoMuted(bool),
    Layer(VideoLayer),
}

/// Preferences applied when a session is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingPreferences {
    pub audio_muted: Option<bool>,
    pub video_muted: Option<bool>,
    pub layer: Option<VideoLayer>,
}

impl PendingPreferences {
    pub fn apply(&mut self, pref: PendingPreference) {
        match pref {
            PendingPreference::AudioMuted(m) => self.audio_muted = Some(m),
            PendingPreference::VideoMuted(m) => self.video_muted = Some(m),
            PendingPreference::Layer(l) => self.layer = Some(l),
        }
    }
}

/// Messages sent to `PlaybackSessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Repeated start: rebind the canvas, or restart after giving up.
    Start {
        canvas: Option<Canvas>,
        decoder: DecoderSettings,
        respond_to: oneshot::Sender<()>,
    },

    SetVolume {
        volume: u32,
        respond_to: oneshot::Sender<()>,
    },

    MuteAudio {
        muted: bool,
        respond_to: oneshot::Sender<()>,
    },

    MuteVideo {
        muted: bool,
        respond_to: oneshot::Sender<()>,
    },

    SetLayer {
        layer: VideoLayer,
        respond_to: oneshot::Sender<()>,
    },

    /// The key store holds a new key for this stream.
    KeyUpdated { respond_to: oneshot::Sender<()> },

    TakeSnapshot {
        respond_to: oneshot::Sender<Snapshot>,
    },

    /// Event reported by the media pipeline.
    Pipeline { kind: PipelineEventKind },

    /// Room Service notification.
    PublisherAvailable,
    PublisherGone,

    GetInfo {
        respond_to: oneshot::Sender<SessionInfo>,
    },
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub stream_id: StreamId,
    pub state: SessionState,
    pub volume: u32,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub requested_layer: VideoLayer,
    /// `None` until the publisher capability is known.
    pub effective_layer: Option<VideoLayer>,
    pub svc_capability: Option<SvcCapability>,
    pub reconnect_attempts: u32,
    /// Time spent in the current outage, zero when connected.
    pub reconnect_elapsed: Duration,
    /// 0 when no key is set.
    pub key_version: u64,
    pub decoder: DecoderSettings,
    pub canvas: Option<Canvas>,
    pub config: PlaybackConfig,
}

/// Current manager status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    pub instance_id: String,
    pub session_count: usize,
    pub pending_preferences: usize,
    pub decoder: DecoderSettings,
    pub is_shutting_down: bool,
    pub mailbox_depth: usize,
    /// Events dropped because a session mailbox was full.
    pub events_dropped: u64,
}

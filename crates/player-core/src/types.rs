//! Public data types shared by the manager, sessions and pipeline.

use crate::errors::SUCCESS_CODE;
use crate::layer::VideoLayer;
use bytes::Bytes;
use common::types::StreamId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Initial connect in flight.
    Connecting,
    /// Media is being decoded and rendered.
    Playing,
    /// Connection lost; reconnection is about to begin.
    Interrupted,
    /// Waiting between, or running, retry attempts.
    Reconnecting,
    /// Reconnect ceiling reached; no further automatic attempts.
    GivenUp,
    /// Session destroyed.
    Stopped,
}

impl SessionState {
    /// Returns the state as a string for metric labels and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Playing => "playing",
            SessionState::Interrupted => "interrupted",
            SessionState::Reconnecting => "reconnecting",
            SessionState::GivenUp => "given_up",
            SessionState::Stopped => "stopped",
        }
    }

    /// Whether a connection attempt may currently be outstanding.
    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Reconnecting)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How video is fitted into the render target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    AspectFit,
    AspectFill,
    ScaleToFill,
}

/// Render target reference. The surface itself belongs to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    /// Opaque identifier of the host surface.
    pub target_id: String,
    #[serde(default)]
    pub view_mode: ViewMode,
}

impl Canvas {
    #[must_use]
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            view_mode: ViewMode::default(),
        }
    }

    #[must_use]
    pub fn with_view_mode(mut self, view_mode: ViewMode) -> Self {
        self.view_mode = view_mode;
        self
    }
}

/// Where media is fetched from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceMode {
    /// Let the pipeline choose.
    #[default]
    Default,
    CdnOnly,
    L3Only,
    RtcOnly,
}

/// Options attached to a stream when it is started. Fixed for the lifetime
/// of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub resource_mode: ResourceMode,
    /// Explicit CDN pull URL, when the stream is served from a CDN.
    #[serde(default)]
    pub cdn_url: Option<String>,
    /// Initial quality layer preference.
    #[serde(default)]
    pub video_layer: VideoLayer,
}

/// State-change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub stream_id: StreamId,
    pub state: SessionState,
    /// [`SUCCESS_CODE`] or a `PlayerError` code.
    pub error_code: i32,
    pub extra_info: serde_json::Value,
}

impl StateUpdate {
    #[must_use]
    pub fn new(stream_id: StreamId, state: SessionState) -> Self {
        Self {
            stream_id,
            state,
            error_code: SUCCESS_CODE,
            extra_info: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error_code: i32) -> Self {
        self.error_code = error_code;
        self
    }

    #[must_use]
    pub fn with_info(mut self, extra_info: serde_json::Value) -> Self {
        self.extra_info = extra_info;
        self
    }
}

/// Result of a snapshot request. Capture failures are reported through
/// `error_code` with an empty image rather than as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Encoded image bytes of one decoded frame.
    pub image: Bytes,
    pub error_code: i32,
}

impl Snapshot {
    #[must_use]
    pub fn captured(image: Bytes) -> Self {
        Self {
            image,
            error_code: SUCCESS_CODE,
        }
    }

    #[must_use]
    pub fn failed(error_code: i32) -> Self {
        Self {
            image: Bytes::new(),
            error_code,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error_code == SUCCESS_CODE && !self.image.is_empty()
    }
}

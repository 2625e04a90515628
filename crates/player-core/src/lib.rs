//! Stream Player Library
//!
//! Playback subsystem that turns a named, already-published audio/video
//! stream into decoded, rendered media:
//!
//! - Registry of playback sessions keyed by stream ID
//! - Per-stream connection state machine with bounded reconnection
//! - Video quality layer selection over SVC and single-layer publishers
//! - Decryption key storage and propagation
//! - Volume, mute and snapshot control without interrupting decode
//!
//! # Architecture
//!
//! ```text
//! PlayerManagerActor (singleton per process)
//! └── supervises N PlaybackSessionActors
//!     └── PlaybackSessionActor (one per active stream)
//!         ├── owns session state, LayerSelector, ReconnectionController
//!         └── issues commands to the shared MediaPipeline
//! ```
//!
//! Every public operation is a method on [`PlayerManagerHandle`]. Progress
//! is reported as [`StateUpdate`] events on a broadcast channel.
//!
//! # Key Design Decisions
//!
//! - **Stop resets, reconnect preserves**: a stop/start cycle spawns a fresh
//!   session with defaults; reconnection keeps the session and its settings
//! - **Hard ceiling**: reconnection gives up at a fixed deadline armed when
//!   the outage begins
//! - **Pipeline at a trait seam**: media work sits behind [`MediaPipeline`]
//!
//! # Modules
//!
//! - [`actors`] - Manager and session actors
//! - [`config`] - Player configuration from environment
//! - [`decoder`] - Global decoder settings
//! - [`errors`] - Error types with stable error codes
//! - [`keys`] - Decryption key store
//! - [`layer`] - Video layer selection
//! - [`observability`] - Metrics and tracing setup
//! - [`pipeline`] - Media pipeline boundary and loopback implementation
//! - [`reconnect`] - Backoff schedule and give-up ceiling
//! - [`types`] - Shared value types

pub mod actors;
pub mod config;
pub mod decoder;
pub mod errors;
pub mod keys;
pub mod layer;
pub mod observability;
pub mod pipeline;
pub mod reconnect;
pub mod types;

pub use actors::PlayerManagerHandle;
pub use errors::PlayerError;
pub use pipeline::MediaPipeline;
pub use types::StateUpdate;

//! Actor model implementation for the stream player.
//!
//! ```text
//! PlayerManagerActor (singleton per process)
//! └── supervises N PlaybackSessionActors
//!     └── PlaybackSessionActor (one per active stream)
//!         ├── owns session state, LayerSelector, ReconnectionController
//!         └── issues commands to the shared MediaPipeline
//! ```
//!
//! # Key Design Decisions
//!
//! - **One session per stream**: the manager registry is keyed by `StreamId`
//! - **CancellationToken propagation**: every session holds a child token of the manager
//! - **Mailbox monitoring**: Depth thresholds (Manager: 100/500, Session: 32/128)
//! - **Message passing**: All inter-actor communication via `tokio::sync::mpsc` channels
//!
//! # Modules
//!
//! - [`manager`] - `PlayerManagerActor` registry and public operation surface
//! - [`session`] - `PlaybackSessionActor` state machine per stream
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod manager;
pub mod messages;
pub mod metrics;
pub mod session;

pub use manager::{PlayerManagerActor, PlayerManagerHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
pub use session::{
    Forwarded, PlaybackSessionActor, PlaybackSessionHandle, DEFAULT_VOLUME, MAX_VOLUME,
};

//! # Player Test Utilities
//!
//! Shared test utilities for the stream player.
//!
//! ## Modules
//!
//! - `mock_pipeline` - Scriptable `MediaPipeline` that records every command
//! - `recorder` - Collects `StateUpdate` events and waits for states
//! - `fixtures` - Stream IDs, keys and player construction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use player_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = TestPlayer::new(MockPipeline::accepting());
//!     let mut recorder = harness.recorder();
//!
//!     harness.manager.start_playing_stream("cam1", None, None).await.unwrap();
//!     recorder.wait_for("cam1", SessionState::Playing).await;
//! }
//! ```

pub mod fixtures;
pub mod mock_pipeline;
pub mod recorder;

pub use fixtures::*;
pub use mock_pipeline::{ConnectBehavior, MockPipeline, PipelineCommand};
pub use recorder::StateRecorder;

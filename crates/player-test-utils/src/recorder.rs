//! State update recorder.
//!
//! Wraps a broadcast receiver from `PlayerManagerHandle::subscribe` and
//! keeps every update it has seen, so tests can wait for a state and then
//! assert on the full transition history of a stream.

use player_core::types::{SessionState, StateUpdate};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Upper bound on any single wait. Under paused time this is virtual.
const WAIT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Collects `StateUpdate` events.
pub struct StateRecorder {
    receiver: broadcast::Receiver<StateUpdate>,
    seen: Vec<StateUpdate>,
}

impl StateRecorder {
    #[must_use]
    pub fn new(receiver: broadcast::Receiver<StateUpdate>) -> Self {
        Self {
            receiver,
            seen: Vec::new(),
        }
    }

    /// Wait until `stream_id` reports `state`, returning that update.
    ///
    /// # Panics
    ///
    /// Panics if the channel closes or the state never arrives.
    pub async fn wait_for(&mut self, stream_id: &str, state: SessionState) -> StateUpdate {
        let wait = async {
            loop {
                let update = match self.receiver.recv().await {
                    Ok(update) => update,
                    Err(RecvError::Lagged(n)) => panic!("recorder lagged by {n} updates"),
                    Err(RecvError::Closed) => panic!("state update channel closed"),
                };
                self.seen.push(update.clone());
                if update.stream_id.as_str() == stream_id && update.state == state {
                    return update;
                }
            }
        };

        tokio::time::timeout(WAIT_TIMEOUT, wait)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {stream_id} to reach {state}"))
    }

    /// Pull in every update already delivered without waiting.
    pub fn drain(&mut self) -> &[StateUpdate] {
        loop {
            match self.receiver.try_recv() {
                Ok(update) => self.seen.push(update),
                Err(TryRecvError::Lagged(n)) => panic!("recorder lagged by {n} updates"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        &self.seen
    }

    /// States recorded so far for one stream, in order.
    #[must_use]
    pub fn states(&self, stream_id: &str) -> Vec<SessionState> {
        self.updates(stream_id).iter().map(|u| u.state).collect()
    }

    #[must_use]
    pub fn updates(&self, stream_id: &str) -> Vec<StateUpdate> {
        self.seen
            .iter()
            .filter(|u| u.stream_id.as_str() == stream_id)
            .cloned()
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

//! Reconnection controller.
//!
//! Decides when a session retries after losing its connection. Retry waits
//! grow exponentially from `min_interval`, carry a small random jitter, and
//! are always clamped to `[min_interval, max_interval]`. The elapsed-time
//! clock starts at the first failure of an outage (not at session creation)
//! and retrying stops once `ceiling` has passed.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Timing parameters for reconnection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Fraction of random spread applied to each wait, in [0, 1).
    pub jitter: f64,
    /// Total retry time for one outage before giving up.
    pub ceiling: Duration,
    /// Time a single connect attempt may take.
    pub attempt_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
            ceiling: Duration::from_secs(20 * 60),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of asking the controller for the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Per-session retry bookkeeping.
#[derive(Debug)]
pub struct ReconnectionController {
    policy: ReconnectPolicy,
    started_at: Option<Instant>,
    attempts: u32,
    next_interval: Duration,
}

impl ReconnectionController {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            started_at: None,
            attempts: 0,
            next_interval: policy.min_interval,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Start the outage clock if it is not already running.
    ///
    /// Returns the instant at which the session must give up.
    pub fn begin(&mut self, now: Instant) -> Instant {
        let started_at = *self.started_at.get_or_insert(now);
        started_at + self.policy.ceiling
    }

    /// Whether an outage is in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    /// Give-up instant for the current outage.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.started_at.map(|t| t + self.policy.ceiling)
    }

    /// Time spent retrying in the current outage.
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t))
    }

    /// Number of retry attempts made in the current outage.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Count an attempt that is about to start.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Decide what to do after a failed attempt.
    pub fn next_delay(&mut self, now: Instant) -> RetryDecision {
        if self.elapsed(now) >= self.policy.ceiling {
            return RetryDecision::GiveUp;
        }

        let base = self.next_interval;
        let delay = self.clamp(self.jittered(base));

        let grown = Duration::try_from_secs_f64(base.as_secs_f64() * self.policy.multiplier)
            .unwrap_or(self.policy.max_interval);
        self.next_interval = self.clamp(grown);

        debug!(
            target: "player.reconnect",
            attempts = self.attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            elapsed_ms = u64::try_from(self.elapsed(now).as_millis()).unwrap_or(u64::MAX),
            "Next reconnect attempt scheduled"
        );

        RetryDecision::RetryAfter(delay)
    }

    /// Clear the outage after a successful reconnect.
    pub fn reset(&mut self) {
        self.started_at = None;
        self.attempts = 0;
        self.next_interval = self.policy.min_interval;
    }

    fn jittered(&self, base: Duration) -> Duration {
        let spread = self.policy.jitter;
        if spread <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-spread..=spread);
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(base)
    }

    fn clamp(&self, d: Duration) -> Duration {
        d.min(self.policy.max_interval).max(self.policy.min_interval)
    }
}

//! Player configuration.
//!
//! Configuration is loaded from environment variables. Numeric values that
//! fail to parse fall back to their defaults; combinations that cannot work
//! (zero ceiling, min interval above max, ...) are rejected.

use crate::decoder::DecoderSettings;
use crate::reconnect::ReconnectPolicy;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default reconnect ceiling: 20 minutes.
pub const DEFAULT_RECONNECT_CEILING_SECONDS: u64 = 20 * 60;

/// Default smallest retry interval.
pub const DEFAULT_RETRY_MIN_INTERVAL_MS: u64 = 1_000;

/// Default largest retry interval.
pub const DEFAULT_RETRY_MAX_INTERVAL_MS: u64 = 30_000;

/// Default exponential growth factor between retries.
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;

/// Default random jitter applied to each retry interval (fraction).
pub const DEFAULT_RETRY_JITTER: f64 = 0.1;

/// Default per-attempt connect timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT_SECONDS: u64 = 10;

/// Default snapshot capture timeout.
pub const DEFAULT_SNAPSHOT_TIMEOUT_MS: u64 = 5_000;

/// Default capacity of the session registry.
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Default player instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "player";

/// Player configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity of this player instance (appears in logs).
    pub instance_id: String,

    /// Total time a session keeps retrying before giving up (default: 20 min).
    pub reconnect_ceiling: Duration,

    /// Smallest wait between retry attempts (default: 1s).
    pub retry_min_interval: Duration,

    /// Largest wait between retry attempts (default: 30s).
    pub retry_max_interval: Duration,

    /// Exponential growth factor between consecutive retries (default: 2.0).
    pub retry_multiplier: f64,

    /// Random jitter fraction applied to each wait, in [0, 1) (default: 0.1).
    pub retry_jitter: f64,

    /// Time a single connect attempt may take before it counts as failed.
    pub attempt_timeout: Duration,

    /// Time a snapshot request may wait for a decodable frame.
    pub snapshot_timeout: Duration,

    /// Decoder settings in force before any `enable_*` call.
    pub initial_decoder_settings: DecoderSettings,

    /// Maximum number of concurrently registered sessions.
    pub max_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_id: format!("{DEFAULT_INSTANCE_ID_PREFIX}-local"),
            reconnect_ceiling: Duration::from_secs(DEFAULT_RECONNECT_CEILING_SECONDS),
            retry_min_interval: Duration::from_millis(DEFAULT_RETRY_MIN_INTERVAL_MS),
            retry_max_interval: Duration::from_millis(DEFAULT_RETRY_MAX_INTERVAL_MS),
            retry_multiplier: DEFAULT_RETRY_MULTIPLIER,
            retry_jitter: DEFAULT_RETRY_JITTER,
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECONDS),
            snapshot_timeout: Duration::from_millis(DEFAULT_SNAPSHOT_TIMEOUT_MS),
            initial_decoder_settings: DecoderSettings::default(),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let reconnect_ceiling = Duration::from_secs(parse_or(
            vars,
            "PLAYER_RECONNECT_CEILING_SECONDS",
            DEFAULT_RECONNECT_CEILING_SECONDS,
        ));

        let retry_min_interval = Duration::from_millis(parse_or(
            vars,
            "PLAYER_RETRY_MIN_INTERVAL_MS",
            DEFAULT_RETRY_MIN_INTERVAL_MS,
        ));

        let retry_max_interval = Duration::from_millis(parse_or(
            vars,
            "PLAYER_RETRY_MAX_INTERVAL_MS",
            DEFAULT_RETRY_MAX_INTERVAL_MS,
        ));

        let retry_multiplier = parse_or(vars, "PLAYER_RETRY_MULTIPLIER", DEFAULT_RETRY_MULTIPLIER);
        let retry_jitter = parse_or(vars, "PLAYER_RETRY_JITTER", DEFAULT_RETRY_JITTER);

        let attempt_timeout = Duration::from_secs(parse_or(
            vars,
            "PLAYER_ATTEMPT_TIMEOUT_SECONDS",
            DEFAULT_ATTEMPT_TIMEOUT_SECONDS,
        ));

        let snapshot_timeout = Duration::from_millis(parse_or(
            vars,
            "PLAYER_SNAPSHOT_TIMEOUT_MS",
            DEFAULT_SNAPSHOT_TIMEOUT_MS,
        ));

        let initial_decoder_settings = DecoderSettings {
            hardware_decode: parse_flag(vars, "PLAYER_HARDWARE_DECODE", false),
            check_poc: parse_flag(vars, "PLAYER_CHECK_POC", true),
        };

        let max_sessions = parse_or(vars, "PLAYER_MAX_SESSIONS", DEFAULT_MAX_SESSIONS);

        let instance_id = vars.get("PLAYER_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        let config = Config {
            instance_id,
            reconnect_ceiling,
            retry_min_interval,
            retry_max_interval,
            retry_multiplier,
            retry_jitter,
            attempt_timeout,
            snapshot_timeout,
            initial_decoder_settings,
            max_sessions,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value combinations that cannot work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconnect_ceiling.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PLAYER_RECONNECT_CEILING_SECONDS must be greater than zero".to_string(),
            ));
        }
        if self.retry_min_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PLAYER_RETRY_MIN_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if self.retry_min_interval > self.retry_max_interval {
            return Err(ConfigError::InvalidValue(format!(
                "retry interval range is empty: min {}ms > max {}ms",
                self.retry_min_interval.as_millis(),
                self.retry_max_interval.as_millis()
            )));
        }
        if !(self.retry_multiplier >= 1.0 && self.retry_multiplier.is_finite()) {
            return Err(ConfigError::InvalidValue(
                "PLAYER_RETRY_MULTIPLIER must be a finite value >= 1.0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.retry_jitter) {
            return Err(ConfigError::InvalidValue(
                "PLAYER_RETRY_JITTER must be in [0, 1)".to_string(),
            ));
        }
        if self.attempt_timeout.is_zero() || self.snapshot_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "attempt and snapshot timeouts must be greater than zero".to_string(),
            ));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue(
                "PLAYER_MAX_SESSIONS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Reconnection policy derived from this configuration.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            min_interval: self.retry_min_interval,
            max_interval: self.retry_max_interval,
            multiplier: self.retry_multiplier,
            jitter: self.retry_jitter,
            ceiling: self.reconnect_ceiling,
            attempt_timeout: self.attempt_timeout,
        }
    }
}

fn parse_or<T: std::str::FromStr>(vars: &HashMap<String, String>, key: &str, default: T) -> T {
    vars.get(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(vars: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match vars.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

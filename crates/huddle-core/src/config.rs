//! Tuning knobs for the transport and the login governor.
//!
//! Both sections deserialize from TOML with every field optional, so a
//! frontend can embed them in its own configuration file and only override
//! what it needs.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Reconnect and polling behaviour of the client transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Reconnects scheduled after the first failure before falling back to polling.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl TransportConfig {
    /// Delay before reconnect number `attempt` (zero-based):
    /// `min(base * 2^attempt, max)`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Thresholds and windows used by [`LoginGovernor`](crate::governor::LoginGovernor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Lifetime of a failed-attempt counter, counted from the first failure.
    #[serde(default = "default_failed_attempt_ttl_secs")]
    pub failed_attempt_ttl_secs: u64,
    #[serde(default = "default_lockout_threshold")]
    pub lockout_threshold: u32,
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u64,
    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,
}

impl GovernorConfig {
    pub fn failed_attempt_ttl(&self) -> Duration {
        Duration::from_secs(self.failed_attempt_ttl_secs)
    }

    pub fn lockout(&self) -> Duration {
        Duration::from_secs(self.lockout_secs)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            failed_attempt_ttl_secs: default_failed_attempt_ttl_secs(),
            lockout_threshold: default_lockout_threshold(),
            lockout_secs: default_lockout_secs(),
            rate_limit: default_rate_limit(),
            rate_window_ms: default_rate_window_ms(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1_000 }
fn default_max_delay_ms() -> u64 { 10_000 }
fn default_poll_interval_ms() -> u64 { 3_000 }
fn default_failed_attempt_ttl_secs() -> u64 { 300 }
fn default_lockout_threshold() -> u32 { 5 }
fn default_lockout_secs() -> u64 { 300 }
fn default_rate_limit() -> u64 { 15 }
fn default_rate_window_ms() -> u64 { 60_000 }

/// Reads and deserializes a TOML file at `path`.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the file does not exist.
/// - [`CoreError::PermissionDenied`] if the file is not readable.
/// - [`CoreError::ConfigParse`] if the TOML is malformed.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied(path.to_path_buf()),
        _ => CoreError::Io(e),
    })?;
    toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
}

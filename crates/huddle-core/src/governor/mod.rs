//! Brute-force protection for the login flow.
//!
//! [`LoginGovernor`] keeps three kinds of records in a [`KvStore`]:
//!
//! - `login_attempts:<id>`: failed-login counter, expiring 300 s after the
//!   first failure of a window.
//! - `lockout:<id>`: absolute `locked_until` time written on the failure that
//!   reaches the lockout threshold.
//! - `ratelimit:<action>:<id>`: fixed-window action counter. Actions never
//!   contain `:`; identifiers may.
//!
//! Lockout escalates only on failed password checks; rate limits count every
//! attempt regardless of outcome. Store failures fail open and are reported
//! through [`Checked::FailedOpen`].

mod checked;

pub use checked::Checked;

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{millis, Clock};
use crate::config::GovernorConfig;
use crate::error::{CoreError, CoreResult};
use crate::kv::KvStore;

/// Lock status of an identifier at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockState {
    pub attempts: u64,
    /// Milliseconds since the epoch, if a lock record exists.
    pub locked_until: Option<u64>,
    /// Time left on an active lock; `None` when not locked.
    pub remaining: Option<Duration>,
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        self.remaining.is_some()
    }
}

pub struct LoginGovernor {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: GovernorConfig,
}

fn failed_key(identifier: &str) -> String {
    format!("login_attempts:{identifier}")
}

fn lock_key(identifier: &str) -> String {
    format!("lockout:{identifier}")
}

const RATE_PREFIX: &str = "ratelimit:";

fn rate_key(action: &str, identifier: &str) -> String {
    format!("{RATE_PREFIX}{action}:{identifier}")
}

/// Identifier part of a rate-limit key. The action ends at the first `:`.
fn rate_key_identifier(key: &str) -> Option<&str> {
    key.strip_prefix(RATE_PREFIX)?
        .split_once(':')
        .map(|(_, identifier)| identifier)
}

impl LoginGovernor {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: GovernorConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Counts a failed login for `identifier` and returns the new count.
    ///
    /// The failure that reaches the lockout threshold also writes the lock
    /// record and stretches the counter's lifetime to cover the lock.
    pub async fn record_failed_attempt(&self, identifier: &str) -> Checked<u64> {
        match self.try_record_failed_attempt(identifier).await {
            Ok(count) => Checked::Verified(count),
            Err(e) => fail_open("record_failed_attempt", identifier, 0, e),
        }
    }

    /// Current failure count, or 0 if absent or expired.
    pub async fn get_failed_attempts(&self, identifier: &str) -> Checked<u64> {
        match self.try_get_failed_attempts(identifier).await {
            Ok(count) => Checked::Verified(count),
            Err(e) => fail_open("get_failed_attempts", identifier, 0, e),
        }
    }

    /// Clears the failure counter and any lock; called after a successful login.
    pub async fn reset_failed_attempts(&self, identifier: &str) -> Checked<()> {
        let result = async {
            self.store.del(&failed_key(identifier)).await?;
            self.store.del(&lock_key(identifier)).await?;
            Ok::<_, CoreError>(())
        }
        .await;
        match result {
            Ok(()) => Checked::Verified(()),
            Err(e) => fail_open("reset_failed_attempts", identifier, (), e),
        }
    }

    /// `true` while the identifier has reached the threshold and its lock
    /// has not yet run out.
    pub async fn is_locked(&self, identifier: &str) -> Checked<bool> {
        self.lock_state(identifier).await.map(|s| s.is_locked())
    }

    pub async fn lock_state(&self, identifier: &str) -> Checked<LockState> {
        match self.try_lock_state(identifier).await {
            Ok(state) => Checked::Verified(state),
            Err(e) => fail_open("lock_state", identifier, LockState::default(), e),
        }
    }

    /// Counts one `action` by `identifier` and returns whether it must be rejected.
    ///
    /// The window starts at the first hit and is not extended by later hits,
    /// so a burst straddling a window boundary can admit up to `2 * limit`.
    pub async fn rate_limit(
        &self,
        identifier: &str,
        action: &str,
        limit: u64,
        window: Duration,
    ) -> Checked<bool> {
        match self.try_rate_limit(identifier, action, limit, window).await {
            Ok(limited) => Checked::Verified(limited),
            Err(e) => fail_open("rate_limit", identifier, false, e),
        }
    }

    /// [`rate_limit`](Self::rate_limit) with the configured limit and window.
    pub async fn check_rate(&self, identifier: &str, action: &str) -> Checked<bool> {
        self.rate_limit(
            identifier,
            action,
            self.config.rate_limit,
            self.config.rate_window(),
        )
        .await
    }

    /// Removes every rate-limit, failed-attempt and lock record of `identifier`.
    ///
    /// The identifier is compared literally, so `*` or a suffix of another
    /// identifier only clears its own records. Returns the number of records
    /// removed. Unlike the per-request checks this surfaces store errors, since
    /// an operator asked for it explicitly.
    pub async fn clear_rate_limits(&self, identifier: &str) -> CoreResult<usize> {
        let mut keys: Vec<String> = self
            .store
            .keys(&format!("{RATE_PREFIX}*"))
            .await?
            .into_iter()
            .filter(|key| rate_key_identifier(key) == Some(identifier))
            .collect();
        keys.push(failed_key(identifier));
        keys.push(lock_key(identifier));

        let mut removed = 0;
        for key in &keys {
            if self.store.del(key).await? {
                removed += 1;
            }
        }
        tracing::info!("Cleared {removed} rate-limit records for {identifier}");
        Ok(removed)
    }

    async fn try_record_failed_attempt(&self, identifier: &str) -> CoreResult<u64> {
        let key = failed_key(identifier);
        let count = self
            .store
            .incr(&key, Some(self.config.failed_attempt_ttl()))
            .await?;
        let count = u64::try_from(count).unwrap_or(0);

        if count == u64::from(self.config.lockout_threshold) {
            let lockout = self.config.lockout();
            let locked_until = self.clock.now_millis().saturating_add(millis(lockout));
            self.store
                .set(&lock_key(identifier), &locked_until.to_string(), Some(lockout))
                .await?;
            self.store.expire(&key, lockout).await?;
            tracing::warn!(
                "Locking {identifier} for {}s after {count} failed attempts",
                lockout.as_secs()
            );
        }
        Ok(count)
    }

    async fn try_get_failed_attempts(&self, identifier: &str) -> CoreResult<u64> {
        let value = self.store.get(&failed_key(identifier)).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    async fn try_lock_state(&self, identifier: &str) -> CoreResult<LockState> {
        let attempts = self.try_get_failed_attempts(identifier).await?;
        let locked_until = self
            .store
            .get(&lock_key(identifier))
            .await?
            .and_then(|v| v.parse::<u64>().ok());

        let now = self.clock.now_millis();
        let remaining = match locked_until {
            Some(until)
                if attempts >= u64::from(self.config.lockout_threshold) && until > now =>
            {
                Some(Duration::from_millis(until - now))
            }
            _ => None,
        };
        Ok(LockState {
            attempts,
            locked_until,
            remaining,
        })
    }

    async fn try_rate_limit(
        &self,
        identifier: &str,
        action: &str,
        limit: u64,
        window: Duration,
    ) -> CoreResult<bool> {
        let key = rate_key(action, identifier);
        let count = self.store.incr(&key, Some(window)).await?;
        let limited = u64::try_from(count).unwrap_or(0) > limit;
        if limited {
            tracing::debug!("Rate limit hit: action={action}, identifier={identifier}, count={count}");
        }
        Ok(limited)
    }
}

fn fail_open<T>(operation: &str, identifier: &str, fallback: T, error: CoreError) -> Checked<T> {
    tracing::warn!("{operation} failed open for {identifier}: {error}");
    Checked::FailedOpen {
        fallback,
        reason: error.to_string(),
    }
}

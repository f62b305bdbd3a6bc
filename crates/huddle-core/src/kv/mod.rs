//! Key-value store abstraction used by the login governor.
//!
//! The trait mirrors the small subset of Redis semantics the governor relies
//! on: string values, atomic `incr`, per-key expiry and glob key listing.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreResult;

#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Returns the value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;

    /// Stores `value`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoreResult<()>;

    /// Atomically increments the integer at `key` (absent counts as 0) and
    /// returns the new value. `ttl` is applied in the same step when the key
    /// is created; an existing expiry is kept.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> CoreResult<i64>;

    /// Sets the expiry of an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CoreResult<bool>;

    /// Remaining lifetime of `key`; `None` if absent or without expiry.
    async fn ttl(&self, key: &str) -> CoreResult<Option<Duration>>;

    /// Removes `key`. Returns `true` if a live key was removed.
    async fn del(&self, key: &str) -> CoreResult<bool>;

    /// Lists live keys matching `pattern`, where `*` matches any run of characters.
    async fn keys(&self, pattern: &str) -> CoreResult<Vec<String>>;
}

/// Glob match supporting only `*`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            pi += 1;
            resume = ti;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            resume += 1;
            ti = resume;
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == b'*')
}

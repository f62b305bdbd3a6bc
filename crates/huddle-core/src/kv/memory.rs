//! In-process [`KvStore`] backed by a `DashMap`.
//!
//! Expired entries are invisible to every operation and are physically
//! removed either when touched or by [`MemoryStore::purge_expired`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{glob_match, KvStore};
use crate::clock::{millis, Clock, SystemClock};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<u64>,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!("Purged {purged} expired keys");
        }
        purged
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn deadline(&self, ttl: Duration) -> u64 {
        self.clock.now_millis().saturating_add(millis(ttl))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let now = self.clock.now_millis();
        let entry = match self.entries.get(key) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if entry.is_live(now) {
            return Ok(Some(entry.value.clone()));
        }
        drop(entry);
        self.entries.remove_if(key, |_, e| !e.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoreResult<()> {
        let expires_at = ttl.map(|t| self.deadline(t));
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> CoreResult<i64> {
        let now = self.clock.now_millis();
        let fresh = || Entry {
            value: "0".to_string(),
            expires_at: ttl.map(|t| self.deadline(t)),
        };
        // The entry guard holds the shard lock, so concurrent increments serialize.
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(fresh);
        if !entry.is_live(now) {
            *entry = fresh();
        }
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| CoreError::NotAnInteger(key.to_string()))?;
        let next = current.saturating_add(1);
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CoreResult<bool> {
        let now = self.clock.now_millis();
        let deadline = self.deadline(ttl);
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = Some(deadline);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> CoreResult<Option<Duration>> {
        let now = self.clock.now_millis();
        Ok(self.entries.get(key).and_then(|entry| match entry.expires_at {
            Some(at) if at > now => Some(Duration::from_millis(at - now)),
            _ => None,
        }))
    }

    async fn del(&self, key: &str) -> CoreResult<bool> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn keys(&self, pattern: &str) -> CoreResult<Vec<String>> {
        let now = self.clock.now_millis();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_live(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn set_then_get() {
        let (store, _) = store();
        store.set("greeting", "hello", None).await.unwrap();
        assert_eq!(store.get("greeting").await.unwrap().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let (store, _) = store();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn value_expires_after_ttl() {
        let (store, clock) = store();
        store
            .set("session", "abc", Some(Duration::from_secs(10)))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(9));
        assert!(store.get("session").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(store.get("session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn incr_counts_from_zero_and_keeps_ttl() {
        let (store, clock) = store();
        assert_eq!(store.incr("hits", None).await.unwrap(), 1);
        assert!(store.expire("hits", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.incr("hits", None).await.unwrap(), 2);

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.ttl("hits").await.unwrap(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn incr_applies_ttl_only_on_creation() {
        let (store, clock) = store();
        let window = Some(Duration::from_secs(60));
        assert_eq!(store.incr("hits", window).await.unwrap(), 1);

        clock.advance(Duration::from_secs(40));
        assert_eq!(store.incr("hits", window).await.unwrap(), 2);
        assert_eq!(store.ttl("hits").await.unwrap(), Some(Duration::from_secs(20)));

        clock.advance(Duration::from_secs(20));
        assert_eq!(store.incr("hits", window).await.unwrap(), 1);
        assert_eq!(store.ttl("hits").await.unwrap(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn incr_restarts_after_expiry() {
        let (store, clock) = store();
        store.incr("hits", None).await.unwrap();
        store.incr("hits", None).await.unwrap();
        store.expire("hits", Duration::from_secs(1)).await.unwrap();

        clock.advance(Duration::from_secs(2));

        assert_eq!(store.incr("hits", None).await.unwrap(), 1);
        assert!(store.ttl("hits").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn incr_rejects_non_integer() {
        let (store, _) = store();
        store.set("name", "ada", None).await.unwrap();
        let err = store.incr("name", None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotAnInteger(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_incr_loses_no_updates() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store.incr("shared", None).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get("shared").await.unwrap().as_deref(), Some("400"));
    }

    #[tokio::test]
    async fn expire_missing_key_returns_false() {
        let (store, _) = store();
        assert!(!store.expire("ghost", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn del_reports_live_removal() {
        let (store, _) = store();
        store.set("k", "v", None).await.unwrap();
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
    }

    #[tokio::test]
    async fn keys_filters_by_pattern_and_expiry() {
        let (store, clock) = store();
        store.set("ratelimit:login:bob", "1", None).await.unwrap();
        store
            .set("ratelimit:reset:bob", "1", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store.set("ratelimit:login:alice", "1", None).await.unwrap();

        assert_eq!(
            store.keys("ratelimit:*:bob").await.unwrap(),
            vec!["ratelimit:login:bob", "ratelimit:reset:bob"]
        );

        clock.advance(Duration::from_secs(5));
        assert_eq!(
            store.keys("ratelimit:*:bob").await.unwrap(),
            vec!["ratelimit:login:bob"]
        );
    }

    #[tokio::test]
    async fn purge_expired_drops_dead_entries() {
        let (store, clock) = store();
        store.set("a", "1", Some(Duration::from_secs(1))).await.unwrap();
        store.set("b", "1", None).await.unwrap();

        clock.advance(Duration::from_secs(2));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}

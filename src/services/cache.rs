//! Keyed expiring cache with coalesced refreshes
//!
//! Entries carry their own expiry chosen by the caller at insert time. A
//! plain lookup never returns an expired payload; expired payloads are only
//! reachable through [`ExpiringCache::get_stale`] or the
//! [`StalePolicy::ServeStale`] path of [`ExpiringCache::get_or_refresh`],
//! and those results are labeled [`Freshness::Stale`].

use crate::error::{AppError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Whether a payload is within its TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
}

/// A cached payload labeled with its freshness
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub freshness: Freshness,
}

impl<T> Cached<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            freshness: Freshness::Fresh,
        }
    }

    pub fn stale(value: T) -> Self {
        Self {
            value,
            freshness: Freshness::Stale,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Cached<U> {
        Cached {
            value: f(self.value),
            freshness: self.freshness,
        }
    }
}

/// What to do when a refresh fails and an expired entry exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalePolicy {
    /// Surface the refresh error
    Reject,
    /// Return the expired payload, labeled stale
    ServeStale,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct FailedRefresh {
    error: AppError,
    at: Instant,
}

/// Per-key refresh state
///
/// `state` doubles as the refresh lock and holds the last failure.
/// `attempts` counts finished refreshes, so a caller that waited on the lock
/// can tell whether a refresh ran in the meantime.
#[derive(Default)]
struct RefreshSlot {
    state: Mutex<Option<FailedRefresh>>,
    attempts: AtomicU64,
}

pub struct ExpiringCache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    slots: Mutex<HashMap<K, Arc<RefreshSlot>>>,
    /// How long a failed refresh is replayed to new callers before retrying
    failure_backoff: Duration,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            failure_backoff: Duration::ZERO,
        }
    }

    /// Replay a failed refresh for `backoff` instead of hitting the upstream
    /// again on every call
    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    /// Live payload for `key`, if any
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Payload for `key` regardless of expiry
    pub async fn get_stale(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub async fn put(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut entries = self.entries.write().await;
        entries.insert(key, entry);
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn slot(&self, key: &K) -> Arc<RefreshSlot> {
        let mut slots = self.slots.lock().await;
        slots.entry(key.clone()).or_default().clone()
    }

    /// Drop the slot once nobody else holds it and it carries no failure
    /// still inside its backoff
    async fn release_slot(&self, key: &K, slot: Arc<RefreshSlot>) {
        let mut slots = self.slots.lock().await;
        // One reference in the map, one here
        if Arc::strong_count(&slot) != 2 {
            return;
        }
        let idle = match slot.state.try_lock() {
            Ok(state) => state
                .as_ref()
                .map_or(true, |failed| Instant::now() >= failed.at + self.failure_backoff),
            Err(_) => false,
        };
        if idle {
            slots.remove(key);
        }
    }

    /// Return the live payload or refresh it through `fetch`
    ///
    /// `fetch` yields the new payload and its TTL. Concurrent callers that
    /// miss on the same key wait for the first caller's refresh and share
    /// its outcome, success or failure, so one expiry costs exactly one
    /// fetch. When the refresh fails, `policy` decides between the error and
    /// the expired payload.
    pub async fn get_or_refresh<F, Fut>(&self, key: K, policy: StalePolicy, fetch: F) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(V, Duration)>>,
    {
        if let Some(value) = self.get(&key).await {
            tracing::debug!(cache = self.name, key = ?key, "Cache hit");
            return Ok(Cached::fresh(value));
        }

        let slot = self.slot(&key).await;
        let result = self.refresh(&key, &slot, policy, fetch).await;
        self.release_slot(&key, slot).await;
        result
    }

    async fn refresh<F, Fut>(&self, key: &K, slot: &RefreshSlot, policy: StalePolicy, fetch: F) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(V, Duration)>>,
    {
        let seen_attempts = slot.attempts.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(value) = self.get(key).await {
            tracing::debug!(cache = self.name, key = ?key, "Cache hit after waiting for refresh");
            return Ok(Cached::fresh(value));
        }

        if let Some(failed) = state.as_ref() {
            let shared = slot.attempts.load(Ordering::Acquire) != seen_attempts;
            if shared || Instant::now() < failed.at + self.failure_backoff {
                tracing::debug!(cache = self.name, key = ?key, "Reusing recent refresh failure");
                let error = failed.error.clone();
                return self.settle_failure(key, policy, error).await;
            }
        }

        tracing::debug!(cache = self.name, key = ?key, "Cache miss, refreshing");
        let outcome = fetch().await;
        slot.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok((value, ttl)) => {
                *state = None;
                self.put(key.clone(), value.clone(), ttl).await;
                Ok(Cached::fresh(value))
            }
            Err(e) => {
                *state = Some(FailedRefresh {
                    error: e.clone(),
                    at: Instant::now(),
                });
                self.settle_failure(key, policy, e).await
            }
        }
    }

    async fn settle_failure(&self, key: &K, policy: StalePolicy, error: AppError) -> Result<Cached<V>> {
        if policy == StalePolicy::ServeStale {
            if let Some(value) = self.get_stale(key).await {
                tracing::warn!(
                    cache = self.name,
                    key = ?key,
                    error = %error,
                    "Refresh failed, serving stale entry"
                );
                return Ok(Cached::stale(value));
            }
        }
        Err(error)
    }
}

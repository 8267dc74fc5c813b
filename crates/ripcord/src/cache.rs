// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Result caching in front of a unit of work.
//!
//! The [`cached`] decorator consults a [`ResultCache`] before invoking the
//! work and stores successful results under a TTL. The get-then-put is
//! deliberately not atomic: concurrent misses for the same key may each run
//! the work, which is acceptable for a cache. Callers who need at-most-one
//! execution per key compose with [`SingleFlight`][crate::flight::SingleFlight].

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Key/value store with per-entry expiry, supplied by the caller.
///
/// Implementations own their concurrency safety; the [`cached`] decorator
/// performs no locking of its own.
pub trait ResultCache<K, V>: Send + Sync {
    /// Returns the live value for `key`, if any.
    fn get(&self, key: &K) -> Option<V>;

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    fn put(&self, key: K, value: V, ttl: Duration);
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-process [`ResultCache`] with lazy expiry.
///
/// Expired entries are dropped when read or overwritten; there is no
/// background sweeper. Use [`purge_expired`][Self::purge_expired] if a
/// long-lived cache with churning keys needs its memory back sooner.
#[derive(Debug)]
pub struct MemoryCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for MemoryCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoryCache<K, V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash,
{
    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, entry| entry.expires_at > now);
    }

    /// Live entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|entry| entry.expires_at > now).count()
    }

    /// Returns `true` if no live entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> ResultCache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        // A TTL too large to represent saturates to decades out.
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30));
        self.entries.lock().insert(key, Entry { value, expires_at });
    }
}

/// Runs `op` unless a live cached value exists for `key`.
///
/// On a hit the work is not invoked. On a miss a successful result is stored
/// under `ttl` before being returned; errors are returned unchanged and never
/// cached.
///
/// # Errors
///
/// The work's own error, on a miss that fails.
pub async fn cached<K, V, E, C, F, Fut>(cache: &C, key: K, ttl: Duration, op: F) -> Result<V, E>
where
    C: ResultCache<K, V> + ?Sized,
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    if let Some(value) = cache.get(&key) {
        return Ok(value);
    }

    let value = op().await?;
    cache.put(key, value.clone(), ttl);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_skips_the_work() {
        let cache = MemoryCache::new();
        let invocations = AtomicU32::new(0);
        let work = || async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(7)
        };

        let first = cached(&cache, "key", Duration::from_millis(100), work).await;
        assert_eq!(first.unwrap(), 7);

        tokio::time::advance(Duration::from_millis(50)).await;
        let second = cached(&cache, "key", Duration::from_millis(100), work).await;
        assert_eq!(second.unwrap(), 7);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_reinvokes_the_work() {
        let cache = MemoryCache::new();
        let invocations = AtomicU32::new(0);
        let work = || async {
            let n = invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(n)
        };

        let first = cached(&cache, "key", Duration::from_millis(100), work).await;
        assert_eq!(first.unwrap(), 0);

        tokio::time::advance(Duration::from_millis(150)).await;
        let second = cached(&cache, "key", Duration::from_millis(100), work).await;
        assert_eq!(second.unwrap(), 1);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_not_cached() {
        let cache: MemoryCache<&str, u32> = MemoryCache::new();
        let invocations = AtomicU32::new(0);

        let failed: Result<u32, String> = cached(&cache, "key", Duration::from_secs(10), || async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Err("boom".to_string())
        })
        .await;
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let ok: Result<u32, String> = cached(&cache, "key", Duration::from_secs(10), || async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok(3)
        })
        .await;
        assert_eq!(ok.unwrap(), 3);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_are_independent() {
        let cache = MemoryCache::new();

        let a: Result<u32, String> = cached(&cache, 1, Duration::from_secs(10), || async { Ok(10) }).await;
        let b: Result<u32, String> = cached(&cache, 2, Duration::from_secs(10), || async { Ok(20) }).await;

        assert_eq!(a.unwrap(), 10);
        assert_eq!(b.unwrap(), 20);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn maximal_ttl_stores_without_overflowing() {
        let cache: MemoryCache<&str, u32> = MemoryCache::new();
        cache.put("forever", 1, Duration::MAX);

        assert_eq!(cache.get(&"forever"), Some(1));
        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(cache.get(&"forever"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_entries() {
        let cache: MemoryCache<&str, u32> = MemoryCache::new();
        cache.put("short", 1, Duration::from_millis(10));
        cache.put("long", 2, Duration::from_secs(60));

        tokio::time::advance(Duration::from_millis(20)).await;
        cache.purge_expired();

        assert!(cache.get(&"short").is_none());
        assert_eq!(cache.get(&"long"), Some(2));
        assert_eq!(cache.len(), 1);
    }
}

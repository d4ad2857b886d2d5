//! Coalescing of concurrent requests for the same logical resource.
//!
//! The first caller for a key starts the computation; everyone arriving while
//! it runs, or within `ttl` after it completes, joins the same shared outcome.
//! After the TTL the entry is gone and the next caller triggers a fresh
//! computation. This is a herd collapser, not a general-purpose cache.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

type SharedOutcome<T> = Shared<BoxFuture<'static, Arc<T>>>;

struct Entry<T> {
    outcome: SharedOutcome<T>,
    generation: u64,
    created_at: Instant,
    completed_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.completed_at.is_some_and(|done| done.elapsed() >= ttl)
    }
}

struct Inner<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
    next_generation: AtomicU64,
    ttl: Duration,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_completed(&self, key: &str, generation: u64) {
        if let Some(entry) = self.lock().get_mut(key) {
            if entry.generation == generation {
                entry.completed_at = Some(Instant::now());
            }
        }
    }

    /// Removes the entry only if it still belongs to `generation`; a newer
    /// computation for the same key may have replaced it meanwhile.
    fn evict(&self, key: &str, generation: u64) {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|e| e.generation == generation) {
            entries.remove(key);
            tracing::trace!(key, "dedup entry evicted");
        }
    }
}

/// Process-level dedup map, owned by whoever constructs it.
pub struct DedupCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DedupCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> DedupCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                ttl,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Join the live computation for `key`, or start one with `factory`.
    ///
    /// The factory runs on a spawned task, so the computation finishes even
    /// if every caller stops waiting.
    pub async fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> Arc<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.join_or_start(key, factory).await
    }

    fn join_or_start<F, Fut>(&self, key: &str, factory: F) -> SharedOutcome<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        // Lookup and insert happen under one lock so two callers can never
        // both start a computation for the same key.
        let mut entries = self.inner.lock();
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(self.inner.ttl) {
                tracing::trace!(
                    key,
                    age_ms = entry.created_at.elapsed().as_millis() as u64,
                    "joining in-flight request"
                );
                return entry.outcome.clone();
            }
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let outcome: SharedOutcome<T> = async move { Arc::new(factory().await) }
            .boxed()
            .shared();
        entries.insert(
            key.to_string(),
            Entry {
                outcome: outcome.clone(),
                generation,
                created_at: Instant::now(),
                completed_at: None,
            },
        );
        drop(entries);

        let inner = Arc::clone(&self.inner);
        let driver = outcome.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            driver.await;
            inner.mark_completed(&key, generation);
            tokio::time::sleep(inner.ttl).await;
            inner.evict(&key, generation);
        });

        outcome
    }

    /// Drop every entry whose key starts with `prefix`. Callers already
    /// waiting on a dropped entry still get its outcome; new callers start
    /// fresh. Returns the number of entries removed.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let mut entries = self.inner.lock();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(prefix, removed, "dedup entries invalidated");
        }
        removed
    }

    /// Number of live (not yet expired) entries.
    pub fn len(&self) -> usize {
        let ttl = self.inner.ttl;
        self.inner.lock().values().filter(|e| !e.is_expired(ttl)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_factory(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, u32> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                value
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_computation() {
        let cache: DedupCache<u32> = DedupCache::new(Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let f = counting_factory(&calls, Duration::from_millis(200), 42);
            handles.push(tokio::spawn(async move { cache.get_or_create("media:42", f).await }));
        }
        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert_eq!(*results[0], 42);
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_within_ttl_reuses_outcome() {
        let cache: DedupCache<u32> = DedupCache::new(Duration::from_secs(2));
        let calls = Arc::new(AtomicUsize::new(0));
        let first = cache
            .get_or_create("k", counting_factory(&calls, Duration::from_millis(10), 1))
            .await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = cache
            .get_or_create("k", counting_factory(&calls, Duration::from_millis(10), 2))
            .await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_fresh_fetch() {
        let cache: DedupCache<u32> = DedupCache::new(Duration::from_millis(300));
        let calls = Arc::new(AtomicUsize::new(0));
        let first = cache
            .get_or_create("k", counting_factory(&calls, Duration::from_millis(10), 1))
            .await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        let second = cache
            .get_or_create("k", counting_factory(&calls, Duration::from_millis(10), 2))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!((*first, *second), (1, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_timer_removes_entry() {
        let cache: DedupCache<u32> = DedupCache::new(Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .get_or_create("k", counting_factory(&calls, Duration::ZERO, 1))
            .await;
        assert_eq!(cache.len(), 1);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(cache.is_empty());
        assert!(cache.inner.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_fresh_fetch() {
        let cache: DedupCache<u32> = DedupCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .get_or_create("media:1", counting_factory(&calls, Duration::ZERO, 1))
            .await;
        cache
            .get_or_create("media:2", counting_factory(&calls, Duration::ZERO, 2))
            .await;
        cache
            .get_or_create("capsule:1", counting_factory(&calls, Duration::ZERO, 3))
            .await;
        assert_eq!(cache.invalidate("media:"), 2);
        assert_eq!(cache.len(), 1);

        let again = cache
            .get_or_create("media:1", counting_factory(&calls, Duration::ZERO, 10))
            .await;
        assert_eq!(*again, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_during_flight_does_not_break_waiters() {
        let cache: DedupCache<u32> = DedupCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let cache = cache.clone();
            let f = counting_factory(&calls, Duration::from_millis(200), 7);
            tokio::spawn(async move { cache.get_or_create("k", f).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.invalidate("k"), 1);
        let fresh = cache
            .get_or_create("k", counting_factory(&calls, Duration::from_millis(10), 8))
            .await;
        assert_eq!(*waiter.await.unwrap(), 7);
        assert_eq!(*fresh, 8);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The first computation's eviction timer must not remove the newer entry.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_do_not_block_each_other() {
        let cache: DedupCache<u32> = DedupCache::new(Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = {
            let cache = cache.clone();
            let f = counting_factory(&calls, Duration::from_secs(30), 1);
            tokio::spawn(async move { cache.get_or_create("slow", f).await })
        };
        let started = Instant::now();
        let fast = cache
            .get_or_create("fast", counting_factory(&calls, Duration::from_millis(5), 2))
            .await;
        assert_eq!(*fast, 2);
        assert!(started.elapsed() < Duration::from_secs(1));
        slow.abort();
    }
}

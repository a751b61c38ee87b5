//! Read-through cache with stampede protection.
//!
//! Every read follows the same path:
//!
//! 1. Look the key up in the backend. A live, decodable entry is returned.
//! 2. Otherwise join the per-key flight. The first caller becomes the leader
//!    and queries the store; later callers wait up to `stampede_wait` for the
//!    leader's result and fall through to their own store read if it does not
//!    arrive (leader slow, failed or cancelled).
//! 3. A leader writes its result back with the entry TTL unless the key was
//!    invalidated while it was reading. An invalidation that lands while the
//!    write itself is pending is caught by a second check after the write,
//!    which deletes the entry again.
//!
//! Backend failures at any step are logged and treated as misses. Store
//! failures are returned to the caller.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use encore_core::{CacheError, CacheSettings, CatalogResult, Lookup};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::freshness::CacheRead;
use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats};

/// Configuration for the read-through cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for cached results.
    pub entry_ttl: Duration,
    /// TTL for cached "not found" results. `None` disables negative caching.
    pub negative_ttl: Option<Duration>,
    /// Maximum time a concurrent miss waits on the in-flight read for its key.
    pub stampede_wait: Duration,
    /// Timeout applied to every backend call.
    pub op_timeout: Duration,
    /// Namespace prepended to every encoded key.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheSettings::default().into()
    }
}

impl From<CacheSettings> for CacheConfig {
    fn from(settings: CacheSettings) -> Self {
        Self {
            entry_ttl: settings.entry_ttl,
            negative_ttl: settings.negative_ttl,
            stampede_wait: settings.stampede_wait,
            op_timeout: settings.op_timeout,
            key_prefix: settings.key_prefix,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Enable negative caching with the given TTL.
    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = Some(ttl);
        self
    }

    /// Set how long concurrent misses wait on an in-flight read.
    pub fn with_stampede_wait(mut self, wait: Duration) -> Self {
        self.stampede_wait = wait;
        self
    }

    /// Set the per-operation backend timeout.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Set the key namespace.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Storage fetcher for one cached query shape.
///
/// The cache calls `fetch` on a miss. Id-keyed fetchers return
/// `Lookup::NotFound` when no row matches; list fetchers always find.
#[async_trait]
pub trait StorageFetcher<T>: Send + Sync {
    async fn fetch(&self) -> CatalogResult<Lookup<T>>;
}

/// What is stored in the backend for each key.
#[derive(Debug, Serialize, Deserialize)]
struct CachedEntry<T> {
    cached_at: DateTime<Utc>,
    value: Lookup<T>,
}

/// Serialized entry shared with followers of an in-flight read.
type Shared = Option<Arc<Vec<u8>>>;

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    store_reads: AtomicU64,
    errors: AtomicU64,
    populates_skipped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Read-through cache over a pluggable backend.
///
/// # Type Parameters
///
/// - `C`: The cache backend. May be `dyn CacheBackend` when the backend is
///   chosen at runtime.
pub struct ReadThroughCache<C: CacheBackend + ?Sized> {
    backend: Arc<C>,
    config: CacheConfig,
    /// One receiver per key with a store read in progress.
    inflight: DashMap<String, watch::Receiver<Shared>>,
    /// Invalidation generation per key. Keys never invalidated are absent
    /// and read as zero.
    generations: DashMap<String, u64>,
    counters: Counters,
}

/// Outcome of joining the flight table for a key.
enum Flight<'a> {
    Leader(watch::Sender<Shared>, FlightGuard<'a>),
    Follower(watch::Receiver<Shared>),
}

/// Removes the leader's flight entry however the leader exits.
struct FlightGuard<'a> {
    inflight: &'a DashMap<String, watch::Receiver<Shared>>,
    key: String,
    rx: watch::Receiver<Shared>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // Invalidation may have replaced the entry with a newer flight.
        self.inflight
            .remove_if(&self.key, |_, current| current.same_channel(&self.rx));
    }
}

impl<C: CacheBackend + ?Sized> ReadThroughCache<C> {
    /// Create a new read-through cache.
    pub fn new(backend: Arc<C>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            inflight: DashMap::new(),
            generations: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Create a new read-through cache with default configuration.
    pub fn with_defaults(backend: Arc<C>) -> Self {
        Self::new(backend, CacheConfig::default())
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the cache backend.
    pub fn backend(&self) -> &C {
        &self.backend
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            store_reads: c.store_reads.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            populates_skipped: c.populates_skipped.load(Ordering::Relaxed),
        }
    }

    /// Number of keys with a store read in progress.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Full backend key for `key`.
    pub fn backend_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.config.key_prefix, key.encode())
    }

    /// Get the value for `key`, falling back to `storage` on a miss.
    ///
    /// Returns a `CacheRead` describing where the value came from. Only
    /// store errors are returned; cache errors degrade to a store read.
    pub async fn get<T, S>(&self, key: &CacheKey, storage: &S) -> CatalogResult<CacheRead<Lookup<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        S: StorageFetcher<T> + ?Sized,
    {
        let full_key = self.backend_key(key);

        if let Some(entry) = self.lookup::<T>(&full_key).await {
            Counters::bump(&self.counters.hits);
            debug!(key = %full_key, "cache hit");
            return Ok(CacheRead::from_cache(entry.value, entry.cached_at));
        }
        Counters::bump(&self.counters.misses);
        debug!(key = %full_key, "cache miss");

        match self.join_flight(&full_key) {
            Flight::Leader(tx, _guard) => self.lead(key, &full_key, tx, storage).await,
            Flight::Follower(rx) => {
                if let Some(read) = self.follow::<T>(&full_key, rx).await {
                    return Ok(read);
                }
                self.fetch_and_populate(key, &full_key, storage).await
            }
        }
    }

    /// Remove `keys` so the next read of each recomputes from the store.
    ///
    /// Idempotent. Backend failures are logged and do not fail the caller;
    /// an entry that could not be deleted expires with its TTL.
    pub async fn invalidate<I>(&self, keys: I)
    where
        I: IntoIterator<Item = CacheKey>,
    {
        for key in keys {
            let full_key = self.backend_key(&key);
            // Bumped before the delete so a populate racing it sees the change.
            *self.generations.entry(full_key.clone()).or_insert(0) += 1;
            // New readers must not join a flight that started before the write.
            self.inflight.remove(&full_key);

            match tokio::time::timeout(self.config.op_timeout, self.backend.delete(&full_key)).await {
                Ok(Ok(())) => debug!(key = %full_key, "cache entry invalidated"),
                Ok(Err(e)) => self.backend_failed("delete", &full_key, &e),
                Err(_) => self.backend_failed("delete", &full_key, &self.timed_out("delete")),
            }
        }
    }

    fn join_flight(&self, full_key: &str) -> Flight<'_> {
        match self.inflight.entry(full_key.to_string()) {
            Entry::Occupied(existing) => Flight::Follower(existing.get().clone()),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx.clone());
                Flight::Leader(
                    tx,
                    FlightGuard {
                        inflight: &self.inflight,
                        key: full_key.to_string(),
                        rx,
                    },
                )
            }
        }
    }

    async fn lead<T, S>(
        &self,
        key: &CacheKey,
        full_key: &str,
        tx: watch::Sender<Shared>,
        storage: &S,
    ) -> CatalogResult<CacheRead<Lookup<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        S: StorageFetcher<T> + ?Sized,
    {
        let generation = self.generation(full_key);
        // On error, `tx` drops unsent and followers fall through.
        let value = self.fetch(storage).await?;
        let entry = CachedEntry {
            cached_at: Utc::now(),
            value,
        };

        match serde_json::to_vec(&entry) {
            Ok(bytes) => {
                let bytes = Arc::new(bytes);
                // Followers may all have timed out already.
                let _ = tx.send(Some(Arc::clone(&bytes)));
                self.populate(key, full_key, &entry.value, Vec::clone(&bytes), generation)
                    .await;
            }
            Err(e) => self.backend_failed("encode", full_key, &CacheError::from(e)),
        }

        Ok(CacheRead::from_store(entry.value))
    }

    async fn follow<T>(&self, full_key: &str, mut rx: watch::Receiver<Shared>) -> Option<CacheRead<Lookup<T>>>
    where
        T: DeserializeOwned,
    {
        let shared: Shared = match tokio::time::timeout(
            self.config.stampede_wait,
            rx.wait_for(Option::is_some),
        )
        .await
        {
            Ok(Ok(value)) => value.clone(),
            Ok(Err(_)) => {
                debug!(key = %full_key, "in-flight read abandoned, reading store");
                None
            }
            Err(_) => {
                debug!(key = %full_key, wait = ?self.config.stampede_wait, "in-flight read too slow, reading store");
                None
            }
        };

        let bytes = shared?;
        match serde_json::from_slice::<CachedEntry<T>>(&bytes) {
            Ok(entry) => {
                Counters::bump(&self.counters.coalesced);
                Some(CacheRead::coalesced(entry.value, entry.cached_at))
            }
            Err(e) => {
                self.backend_failed("decode", full_key, &CacheError::from(e));
                None
            }
        }
    }

    /// Store read for a caller that could not use the in-flight result.
    async fn fetch_and_populate<T, S>(
        &self,
        key: &CacheKey,
        full_key: &str,
        storage: &S,
    ) -> CatalogResult<CacheRead<Lookup<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        S: StorageFetcher<T> + ?Sized,
    {
        let generation = self.generation(full_key);
        let value = self.fetch(storage).await?;
        let entry = CachedEntry {
            cached_at: Utc::now(),
            value,
        };
        match serde_json::to_vec(&entry) {
            Ok(bytes) => self.populate(key, full_key, &entry.value, bytes, generation).await,
            Err(e) => self.backend_failed("encode", full_key, &CacheError::from(e)),
        }
        Ok(CacheRead::from_store(entry.value))
    }

    async fn fetch<T, S>(&self, storage: &S) -> CatalogResult<Lookup<T>>
    where
        S: StorageFetcher<T> + ?Sized,
    {
        Counters::bump(&self.counters.store_reads);
        storage.fetch().await
    }

    async fn lookup<T: DeserializeOwned>(&self, full_key: &str) -> Option<CachedEntry<T>> {
        let bytes = match tokio::time::timeout(self.config.op_timeout, self.backend.get(full_key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                self.backend_failed("get", full_key, &e);
                return None;
            }
            Err(_) => {
                self.backend_failed("get", full_key, &self.timed_out("get"));
                return None;
            }
        };

        match serde_json::from_slice::<CachedEntry<T>>(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                // Written by an incompatible build or corrupted; recompute.
                self.backend_failed("decode", full_key, &CacheError::from(e));
                None
            }
        }
    }

    fn generation(&self, full_key: &str) -> u64 {
        self.generations.get(full_key).map_or(0, |g| *g)
    }

    async fn populate<T>(&self, key: &CacheKey, full_key: &str, value: &Lookup<T>, bytes: Vec<u8>, generation: u64) {
        let ttl = match value {
            Lookup::Found(_) => self.config.entry_ttl,
            Lookup::NotFound => match self.config.negative_ttl {
                Some(ttl) => ttl,
                None => return,
            },
        };

        if self.generation(full_key) != generation {
            Counters::bump(&self.counters.populates_skipped);
            debug!(key = %full_key, "invalidated during store read, not caching");
            return;
        }

        match tokio::time::timeout(self.config.op_timeout, self.backend.set(full_key, bytes, ttl)).await {
            Ok(Ok(())) => debug!(key = %full_key, operation = key.operation(), ttl = ?ttl, "cache populated"),
            Ok(Err(e)) => self.backend_failed("set", full_key, &e),
            Err(_) => self.backend_failed("set", full_key, &self.timed_out("set")),
        }

        // An invalidation may have deleted the key before this write landed.
        if self.generation(full_key) != generation {
            Counters::bump(&self.counters.populates_skipped);
            debug!(key = %full_key, "invalidated during cache write, removing entry");
            match tokio::time::timeout(self.config.op_timeout, self.backend.delete(full_key)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.backend_failed("delete", full_key, &e),
                Err(_) => self.backend_failed("delete", full_key, &self.timed_out("delete")),
            }
        }
    }

    fn timed_out(&self, operation: &'static str) -> CacheError {
        CacheError::Timeout {
            operation,
            elapsed: self.config.op_timeout,
        }
    }

    fn backend_failed(&self, operation: &str, full_key: &str, error: &CacheError) {
        Counters::bump(&self.counters.errors);
        warn!(
            backend = self.backend.name(),
            operation,
            key = %full_key,
            error = %error,
            "cache operation failed, continuing without cache"
        );
    }
}

/// Adapts a closure returning an owned future into a [`StorageFetcher`].
pub struct FnFetcher<F>(pub F);

#[async_trait]
impl<T, F, Fut> StorageFetcher<T> for FnFetcher<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = CatalogResult<Lookup<T>>> + Send + 'static,
{
    async fn fetch(&self) -> CatalogResult<Lookup<T>> {
        (self.0)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_backend::InMemoryCacheBackend;
    use crate::cache::freshness::ReadSource;
    use encore_core::{CatalogError, CatalogId, SongId, StorageError};
    use std::sync::atomic::AtomicUsize;

    struct CountingFetcher {
        calls: AtomicUsize,
        value: Lookup<String>,
    }

    impl CountingFetcher {
        fn found(value: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                value: Lookup::Found(value.to_string()),
            }
        }

        fn missing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                value: Lookup::NotFound,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StorageFetcher<String> for CountingFetcher {
        async fn fetch(&self) -> CatalogResult<Lookup<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    fn cache() -> ReadThroughCache<InMemoryCacheBackend> {
        ReadThroughCache::with_defaults(Arc::new(InMemoryCacheBackend::new()))
    }

    #[tokio::test]
    async fn test_miss_then_hit() -> CatalogResult<()> {
        let cache = cache();
        let key = CacheKey::song_detail(SongId::new(1));
        let fetcher = CountingFetcher::found("a");

        let first = cache.get(&key, &fetcher).await?;
        assert_eq!(first.source(), ReadSource::Store);

        let second = cache.get(&key, &fetcher).await?;
        assert_eq!(second.source(), ReadSource::Cache);
        assert_eq!(second.into_value(), Lookup::Found("a".to_string()));
        assert_eq!(fetcher.calls(), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.store_reads), (1, 1, 1));
        assert_eq!(cache.inflight_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached_by_default() -> CatalogResult<()> {
        let cache = cache();
        let key = CacheKey::song_detail(SongId::new(404));
        let fetcher = CountingFetcher::missing();

        assert!(cache.get(&key, &fetcher).await?.into_value().is_not_found());
        assert!(cache.get(&key, &fetcher).await?.into_value().is_not_found());
        assert_eq!(fetcher.calls(), 2);
        assert!(cache.backend().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_ttl_caches_not_found_briefly() -> CatalogResult<()> {
        let config = CacheConfig::new().with_negative_ttl(Duration::from_secs(2));
        let cache = ReadThroughCache::new(Arc::new(InMemoryCacheBackend::new()), config);
        let key = CacheKey::song_detail(SongId::new(404));
        let fetcher = CountingFetcher::missing();

        cache.get(&key, &fetcher).await?;
        let cached = cache.get(&key, &fetcher).await?;
        assert!(cached.was_cache_hit());
        assert_eq!(fetcher.calls(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        cache.get(&key, &fetcher).await?;
        assert_eq!(fetcher.calls(), 2, "negative entry must expire");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() -> CatalogResult<()> {
        let cache = cache();
        let key = CacheKey::album_list();
        let fetcher = CountingFetcher::found("v1");

        cache.get(&key, &fetcher).await?;
        cache.invalidate([key]).await;
        // Invalidating an absent key is a no-op.
        cache.invalidate([key]).await;

        let read = cache.get(&key, &fetcher).await?;
        assert_eq!(read.source(), ReadSource::Store);
        assert_eq!(fetcher.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_error_propagates_and_clears_flight() {
        let cache = cache();
        let key = CacheKey::song_list();
        let failing = FnFetcher(|| async {
            Err::<Lookup<String>, _>(CatalogError::from(StorageError::Unavailable {
                reason: "connection refused".to_string(),
            }))
        });

        let result = cache.get::<String, _>(&key, &failing).await;
        assert!(matches!(result, Err(CatalogError::Storage(StorageError::Unavailable { .. }))));
        assert_eq!(cache.inflight_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() -> CatalogResult<()> {
        let cache = cache();
        let key = CacheKey::song_list();
        let full_key = cache.backend_key(&key);
        cache
            .backend()
            .set(&full_key, b"{not json".to_vec(), Duration::from_secs(60))
            .await?;

        let fetcher = CountingFetcher::found("fresh");
        let read = cache.get(&key, &fetcher).await?;
        assert_eq!(read.into_value(), Lookup::Found("fresh".to_string()));
        assert_eq!(cache.stats().errors, 1);
        Ok(())
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::new()
            .with_ttl(Duration::from_secs(30))
            .with_negative_ttl(Duration::from_secs(5))
            .with_stampede_wait(Duration::from_millis(50))
            .with_op_timeout(Duration::from_millis(20))
            .with_key_prefix("test:");

        assert_eq!(config.entry_ttl, Duration::from_secs(30));
        assert_eq!(config.negative_ttl, Some(Duration::from_secs(5)));
        assert_eq!(config.stampede_wait, Duration::from_millis(50));
        assert_eq!(config.op_timeout, Duration::from_millis(20));
        assert_eq!(config.key_prefix, "test:");
    }

    #[test]
    fn test_backend_key_uses_prefix() {
        let cache = cache();
        assert_eq!(cache.backend_key(&CacheKey::album_list()), "encore:album:list");
    }
}

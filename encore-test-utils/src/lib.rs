//! ENCORE Test Utilities
//!
//! Shared test infrastructure for the ENCORE workspace:
//! - Test doubles for the catalog store and cache backends
//! - Proptest generators for catalog types
//! - Fixtures for common catalog shapes
//! - Assertions on catalog results

// Re-export the in-memory implementations from their source crate
pub use encore_storage::{InMemoryCacheBackend, InMemoryCatalogStore};

// Re-export core types for convenience
pub use encore_core::{
    Album, AlbumId, AlbumWithSongs, CacheError, CatalogError, CatalogId, CatalogResult, Lookup,
    NewAlbum, NewSong, Song, SongId, StorageError, Timestamp,
};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use encore_storage::{CacheBackend, CatalogStore};

// ============================================================================
// STORE DOUBLES
// ============================================================================

/// Per-operation query counts recorded by [`CountingStore`].
#[derive(Debug, Default)]
struct QueryCounts {
    album_list: AtomicU64,
    album_get: AtomicU64,
    song_list: AtomicU64,
    song_list_by_album: AtomicU64,
    song_get: AtomicU64,
    inserts: AtomicU64,
    song_get_by_id: DashMap<SongId, u64>,
    album_get_by_id: DashMap<AlbumId, u64>,
}

/// Catalog store that counts the queries it receives.
///
/// Wraps an [`InMemoryCatalogStore`]. Reads can be slowed down with
/// [`CountingStore::with_delay`] to hold concurrent callers in flight, and
/// the whole store can be switched to failing with [`CountingStore::set_failing`].
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryCatalogStore,
    counts: QueryCounts,
    delay: Option<Duration>,
    failing: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before answering every read.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The wrapped store, for seeding and direct inspection.
    pub fn inner(&self) -> &InMemoryCatalogStore {
        &self.inner
    }

    /// Make every subsequent call fail with `StorageError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn album_list_queries(&self) -> u64 {
        self.counts.album_list.load(Ordering::SeqCst)
    }

    pub fn album_get_queries(&self) -> u64 {
        self.counts.album_get.load(Ordering::SeqCst)
    }

    pub fn song_list_queries(&self) -> u64 {
        self.counts.song_list.load(Ordering::SeqCst)
    }

    pub fn song_list_by_album_queries(&self) -> u64 {
        self.counts.song_list_by_album.load(Ordering::SeqCst)
    }

    pub fn song_get_queries(&self) -> u64 {
        self.counts.song_get.load(Ordering::SeqCst)
    }

    pub fn insert_queries(&self) -> u64 {
        self.counts.inserts.load(Ordering::SeqCst)
    }

    /// Number of `song_get` queries issued for `id`.
    pub fn song_get_queries_for(&self, id: SongId) -> u64 {
        self.counts.song_get_by_id.get(&id).map_or(0, |count| *count)
    }

    /// Number of `album_get` queries issued for `id`.
    pub fn album_get_queries_for(&self, id: AlbumId) -> u64 {
        self.counts.album_get_by_id.get(&id).map_or(0, |count| *count)
    }

    /// Total read queries of any kind.
    pub fn total_reads(&self) -> u64 {
        self.album_list_queries()
            + self.album_get_queries()
            + self.song_list_queries()
            + self.song_list_by_album_queries()
            + self.song_get_queries()
    }

    async fn before_read(&self, counter: &AtomicU64) -> CatalogResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failing()
    }

    fn check_failing(&self) -> CatalogResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "store switched off by test".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for CountingStore {
    async fn album_list(&self) -> CatalogResult<Vec<Album>> {
        self.before_read(&self.counts.album_list).await?;
        self.inner.album_list().await
    }

    async fn album_get(&self, id: AlbumId) -> CatalogResult<Option<Album>> {
        *self.counts.album_get_by_id.entry(id).or_insert(0) += 1;
        self.before_read(&self.counts.album_get).await?;
        self.inner.album_get(id).await
    }

    async fn album_insert(&self, album: &NewAlbum) -> CatalogResult<Album> {
        self.counts.inserts.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.inner.album_insert(album).await
    }

    async fn song_list(&self) -> CatalogResult<Vec<Song>> {
        self.before_read(&self.counts.song_list).await?;
        self.inner.song_list().await
    }

    async fn song_list_by_album(&self, album_id: AlbumId) -> CatalogResult<Vec<Song>> {
        self.before_read(&self.counts.song_list_by_album).await?;
        self.inner.song_list_by_album(album_id).await
    }

    async fn song_get(&self, id: SongId) -> CatalogResult<Option<Song>> {
        *self.counts.song_get_by_id.entry(id).or_insert(0) += 1;
        self.before_read(&self.counts.song_get).await?;
        self.inner.song_get(id).await
    }

    async fn song_insert(&self, song: &NewSong) -> CatalogResult<Song> {
        self.counts.inserts.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.inner.song_insert(song).await
    }

    async fn ping(&self) -> CatalogResult<()> {
        self.check_failing()
    }
}

// ============================================================================
// CACHE DOUBLES
// ============================================================================

/// Cache backend where every operation fails as if Redis were down.
#[derive(Debug, Default)]
pub struct FailingCacheBackend {
    calls: AtomicU64,
}

impl FailingCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted against this backend.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable {
            reason: "connection refused".to_string(),
        })
    }
}

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        self.fail()
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.fail()
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Cache backend whose operations never complete.
///
/// Exercises the per-operation timeout: every call must be cut off by the
/// caller.
#[derive(Debug, Default)]
pub struct HangingCacheBackend;

#[async_trait]
impl CacheBackend for HangingCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        std::future::pending().await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        std::future::pending().await
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}

/// In-process cache whose writes take `delay` to land.
///
/// Reads and deletes are immediate, so an invalidation can overtake a
/// pending populate.
#[derive(Debug)]
pub struct SlowWriteCacheBackend {
    inner: InMemoryCacheBackend,
    delay: Duration,
}

impl SlowWriteCacheBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryCacheBackend::new(),
            delay,
        }
    }
}

#[async_trait]
impl CacheBackend for SlowWriteCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.inner.ping().await
    }

    fn name(&self) -> &'static str {
        "slow-write"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating ENCORE catalog types.

    use super::*;
    use encore_storage::CacheKey;
    use proptest::prelude::*;

    /// Generate a positive AlbumId, as a `SERIAL` column would assign.
    pub fn arb_album_id() -> impl Strategy<Value = AlbumId> {
        (1i32..=i32::MAX).prop_map(AlbumId::new)
    }

    /// Generate a positive SongId.
    pub fn arb_song_id() -> impl Strategy<Value = SongId> {
        (1i32..=i32::MAX).prop_map(SongId::new)
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // Generate timestamps within a reasonable range (2020-2030)
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate any cache key shape.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        prop_oneof![
            Just(CacheKey::album_list()),
            Just(CacheKey::song_list()),
            arb_album_id().prop_map(CacheKey::album_detail),
            arb_song_id().prop_map(CacheKey::song_detail),
        ]
    }

    /// Generate a valid album payload.
    pub fn arb_new_album() -> impl Strategy<Value = NewAlbum> {
        ("[A-Za-z][A-Za-z ]{0,40}", "[a-z][a-z ]{0,79}").prop_map(|(title, description)| NewAlbum {
            title,
            description,
            thumbnail: "https://cdn.example/album.png".to_string(),
        })
    }

    /// Generate a valid song payload for `album_id`.
    pub fn arb_new_song(album_id: AlbumId) -> impl Strategy<Value = NewSong> {
        ("[A-Za-z][A-Za-z ]{0,40}", "[a-z][a-z ]{0,79}", any::<bool>()).prop_map(
            move |(title, description, with_thumbnail)| NewSong {
                title,
                description,
                thumbnail: with_thumbnail.then(|| "https://cdn.example/song.png".to_string()),
                audio: "https://cdn.example/song.mp3".to_string(),
                album_id,
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built catalog rows for common testing scenarios.

    use super::*;

    /// An album row with the given id and title.
    pub fn album(id: i32, title: &str) -> Album {
        Album {
            id: AlbumId::new(id),
            title: title.to_string(),
            description: format!("{title} description"),
            thumbnail: format!("https://cdn.example/albums/{id}.png"),
            created_at: Utc::now(),
        }
    }

    /// A song row with the given id, optionally on an album.
    pub fn song(id: i32, title: &str, album_id: Option<i32>) -> Song {
        Song {
            id: SongId::new(id),
            title: title.to_string(),
            description: format!("{title} description"),
            thumbnail: None,
            audio: format!("https://cdn.example/songs/{id}.mp3"),
            album_id: album_id.map(AlbumId::new),
            created_at: Utc::now(),
        }
    }

    /// A valid album payload.
    pub fn new_album(title: &str) -> NewAlbum {
        NewAlbum {
            title: title.to_string(),
            description: format!("{title} description"),
            thumbnail: "https://cdn.example/albums/new.png".to_string(),
        }
    }

    /// A valid song payload on `album_id`.
    pub fn new_song(title: &str, album_id: AlbumId) -> NewSong {
        NewSong {
            title: title.to_string(),
            description: format!("{title} description"),
            thumbnail: None,
            audio: "https://cdn.example/songs/new.mp3".to_string(),
            album_id,
        }
    }

    /// A store holding album 1 "A" with song 10 on it.
    pub fn single_album_store() -> CatalogResult<CountingStore> {
        let store = CountingStore::new();
        store.inner().seed_album(album(1, "A"))?;
        store.inner().seed_song(song(10, "Track", Some(1)))?;
        Ok(store)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on catalog results.

    use super::*;

    /// Assert that a lookup found a value and return it.
    #[track_caller]
    pub fn assert_found<T: std::fmt::Debug>(lookup: Lookup<T>) -> T {
        match lookup {
            Lookup::Found(value) => value,
            Lookup::NotFound => panic!("Expected Found, got NotFound"),
        }
    }

    /// Assert that a lookup found nothing.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(lookup: &Lookup<T>) {
        assert!(lookup.is_not_found(), "Expected NotFound, got: {:?}", lookup);
    }

    /// Assert that a CatalogResult is a storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &CatalogResult<T>) {
        match result {
            Err(CatalogError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counting_store_counts_by_id() -> CatalogResult<()> {
        let store = fixtures::single_album_store()?;
        store.song_get(SongId::new(10)).await?;
        store.song_get(SongId::new(10)).await?;
        store.song_get(SongId::new(11)).await?;

        assert_eq!(store.song_get_queries(), 3);
        assert_eq!(store.song_get_queries_for(SongId::new(10)), 2);
        assert_eq!(store.song_get_queries_for(SongId::new(12)), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_counting_store_failure_toggle() {
        let store = CountingStore::new();
        store.set_failing(true);
        assertions::assert_storage_error(&store.album_list().await);

        store.set_failing(false);
        assert!(store.album_list().await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_backend_always_errors() {
        let backend = FailingCacheBackend::new();
        assert!(backend.get("k").await.is_err());
        assert!(backend.delete("k").await.is_err());
        assert_eq!(backend.calls(), 2);
    }
}

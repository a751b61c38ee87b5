//! Cached catalog facade.
//!
//! Handlers talk to [`CachedCatalog`] only. Reads go through the
//! cache-aside [`CatalogReader`]; writes go straight to the store and then
//! invalidate every key whose projection they changed.

use std::sync::Arc;
use std::time::Duration;

use encore_core::{
    Album, AlbumId, AlbumWithSongs, CatalogResult, Lookup, NewAlbum, NewSong, Song, SongId,
};
use encore_storage::{
    CacheBackend, CacheConfig, CacheKey, CacheRead, CacheStats, CatalogReader, CatalogStore,
};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics;

/// Type-erased store used by the API.
pub type DynCatalogStore = dyn CatalogStore;

/// Catalog access for HTTP handlers.
pub struct CachedCatalog {
    reader: CatalogReader<DynCatalogStore>,
}

impl CachedCatalog {
    /// Create a facade over `store` caching in `backend`.
    pub fn new(
        store: Arc<DynCatalogStore>,
        backend: Arc<dyn CacheBackend>,
        config: CacheConfig,
    ) -> Self {
        Self {
            reader: CatalogReader::new(store, backend, config),
        }
    }

    /// Cache usage counters.
    pub fn stats(&self) -> CacheStats {
        self.reader.stats()
    }

    /// Name of the active cache backend.
    pub fn backend_name(&self) -> &'static str {
        self.reader.backend().name()
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub async fn list_albums(&self) -> ApiResult<Vec<Album>> {
        let read = self.reader.list_albums_read().await;
        Ok(record(CacheKey::album_list(), read)?)
    }

    pub async fn list_songs(&self) -> ApiResult<Vec<Song>> {
        let read = self.reader.list_songs_read().await;
        Ok(record(CacheKey::song_list(), read)?)
    }

    pub async fn album_with_songs(&self, id: AlbumId) -> ApiResult<Lookup<AlbumWithSongs>> {
        let read = self.reader.get_album_with_songs_read(id).await;
        Ok(record(CacheKey::album_detail(id), read)?)
    }

    pub async fn song(&self, id: SongId) -> ApiResult<Lookup<Song>> {
        let read = self.reader.get_song_read(id).await;
        Ok(record(CacheKey::song_detail(id), read)?)
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Insert an album, then invalidate the album listing.
    pub async fn create_album(&self, album: &NewAlbum) -> ApiResult<Album> {
        album.validate()?;
        let created = self.reader.store().album_insert(album).await?;
        self.reader
            .invalidate(CacheKey::for_album_created(created.id))
            .await;
        info!(album_id = %created.id, "Album created");
        Ok(created)
    }

    /// Insert a song, then invalidate the song listing and its album's detail.
    ///
    /// The album is checked against the store, not the cache, so a cached
    /// listing cannot admit a song for a deleted album.
    pub async fn create_song(&self, song: &NewSong) -> ApiResult<Song> {
        song.validate()?;
        if self.reader.store().album_get(song.album_id).await?.is_none() {
            debug!(album_id = %song.album_id, "Song rejected, album missing");
            return Err(ApiError::album_not_found());
        }
        let created = self.reader.store().song_insert(song).await?;
        self.reader
            .invalidate(CacheKey::for_song_created(created.id, created.album_id))
            .await;
        info!(song_id = %created.id, album_id = ?created.album_id, "Song created");
        Ok(created)
    }

    // ========================================================================
    // HEALTH
    // ========================================================================

    /// Check the store is reachable.
    pub async fn ping_store(&self) -> CatalogResult<()> {
        self.reader.store().ping().await
    }

    /// Check the cache backend is reachable within `limit`.
    pub async fn ping_cache(&self, limit: Duration) -> Result<(), String> {
        match tokio::time::timeout(limit, self.reader.backend().ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("ping timed out after {:?}", limit)),
        }
    }
}

fn record<T>(key: CacheKey, read: CatalogResult<CacheRead<T>>) -> CatalogResult<T> {
    let read = read?;
    if let Some(metrics) = metrics() {
        metrics.record_cache_lookup(key.operation(), read.source());
    }
    debug!(
        operation = key.operation(),
        source = read.source().as_str(),
        staleness_ms = read.staleness().as_millis() as u64,
        "Catalog read"
    );
    Ok(read.into_value())
}

//! Cache-aside catalog reader.
//!
//! The read side of the catalog: listings and id lookups go through a
//! [`ReadThroughCache`] in front of a [`CatalogStore`]. Write paths call
//! [`CatalogReader::invalidate`] after a successful mutation.

use std::sync::Arc;

use async_trait::async_trait;
use encore_core::{Album, AlbumId, AlbumWithSongs, CatalogResult, Lookup, Song, SongId};
use tracing::debug;

use crate::cache::{
    CacheBackend, CacheConfig, CacheKey, CacheRead, CacheStats, ReadThroughCache, StorageFetcher,
};
use crate::store::CatalogStore;

/// Catalog reads with a cache in front of the store.
pub struct CatalogReader<S: CatalogStore + ?Sized> {
    store: Arc<S>,
    cache: ReadThroughCache<dyn CacheBackend>,
}

impl<S: CatalogStore + ?Sized> CatalogReader<S> {
    /// Create a reader over `store` caching in `backend`.
    pub fn new(store: Arc<S>, backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            store,
            cache: ReadThroughCache::new(backend, config),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The cache backend.
    pub fn backend(&self) -> &dyn CacheBackend {
        self.cache.backend()
    }

    /// Cache usage counters.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// All albums. Cache failures degrade to a store read.
    pub async fn list_albums(&self) -> CatalogResult<Vec<Album>> {
        Ok(self.list_albums_read().await?.into_value())
    }

    /// All songs. Cache failures degrade to a store read.
    pub async fn list_songs(&self) -> CatalogResult<Vec<Song>> {
        Ok(self.list_songs_read().await?.into_value())
    }

    /// An album with its songs, or `NotFound` if no such album exists.
    pub async fn get_album_with_songs(&self, id: AlbumId) -> CatalogResult<Lookup<AlbumWithSongs>> {
        Ok(self.get_album_with_songs_read(id).await?.into_value())
    }

    /// A song, or `NotFound` if no such song exists.
    pub async fn get_song(&self, id: SongId) -> CatalogResult<Lookup<Song>> {
        Ok(self.get_song_read(id).await?.into_value())
    }

    /// Drop cached entries for `keys`. Never fails.
    pub async fn invalidate<I>(&self, keys: I)
    where
        I: IntoIterator<Item = CacheKey>,
    {
        self.cache.invalidate(keys).await
    }

    pub async fn list_albums_read(&self) -> CatalogResult<CacheRead<Vec<Album>>> {
        let query = AlbumListQuery(self.store.as_ref());
        let read = self.cache.get(&CacheKey::album_list(), &query).await?;
        Ok(read.map(Self::list_or_empty))
    }

    pub async fn list_songs_read(&self) -> CatalogResult<CacheRead<Vec<Song>>> {
        let query = SongListQuery(self.store.as_ref());
        let read = self.cache.get(&CacheKey::song_list(), &query).await?;
        Ok(read.map(Self::list_or_empty))
    }

    pub async fn get_album_with_songs_read(
        &self,
        id: AlbumId,
    ) -> CatalogResult<CacheRead<Lookup<AlbumWithSongs>>> {
        let query = AlbumDetailQuery(self.store.as_ref(), id);
        self.cache.get(&CacheKey::album_detail(id), &query).await
    }

    pub async fn get_song_read(&self, id: SongId) -> CatalogResult<CacheRead<Lookup<Song>>> {
        let query = SongQuery(self.store.as_ref(), id);
        self.cache.get(&CacheKey::song_detail(id), &query).await
    }

    fn list_or_empty<T>(lookup: Lookup<Vec<T>>) -> Vec<T> {
        lookup.into_option().unwrap_or_default()
    }
}

// ============================================================================
// STORE QUERIES
// ============================================================================

/// `album_list` as a cache fetcher.
struct AlbumListQuery<'a, S: ?Sized>(&'a S);

/// `song_list` as a cache fetcher.
struct SongListQuery<'a, S: ?Sized>(&'a S);

/// One album plus the songs that reference it.
struct AlbumDetailQuery<'a, S: ?Sized>(&'a S, AlbumId);

/// `song_get` as a cache fetcher.
struct SongQuery<'a, S: ?Sized>(&'a S, SongId);

#[async_trait]
impl<'a, S: CatalogStore + ?Sized> StorageFetcher<Vec<Album>> for AlbumListQuery<'a, S> {
    async fn fetch(&self) -> CatalogResult<Lookup<Vec<Album>>> {
        Ok(Lookup::Found(self.0.album_list().await?))
    }
}

#[async_trait]
impl<'a, S: CatalogStore + ?Sized> StorageFetcher<Vec<Song>> for SongListQuery<'a, S> {
    async fn fetch(&self) -> CatalogResult<Lookup<Vec<Song>>> {
        Ok(Lookup::Found(self.0.song_list().await?))
    }
}

#[async_trait]
impl<'a, S: CatalogStore + ?Sized> StorageFetcher<AlbumWithSongs> for AlbumDetailQuery<'a, S> {
    async fn fetch(&self) -> CatalogResult<Lookup<AlbumWithSongs>> {
        let AlbumDetailQuery(store, id) = *self;
        let Some(album) = store.album_get(id).await? else {
            debug!(album_id = %id, "album not found");
            return Ok(Lookup::NotFound);
        };
        let songs = store.song_list_by_album(id).await?;
        Ok(Lookup::Found(AlbumWithSongs { songs, album }))
    }
}

#[async_trait]
impl<'a, S: CatalogStore + ?Sized> StorageFetcher<Song> for SongQuery<'a, S> {
    async fn fetch(&self) -> CatalogResult<Lookup<Song>> {
        Ok(self.0.song_get(self.1).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheBackend;
    use crate::store::InMemoryCatalogStore;
    use encore_core::NewAlbum;

    fn reader() -> CatalogReader<InMemoryCatalogStore> {
        CatalogReader::new(
            Arc::new(InMemoryCatalogStore::new()),
            Arc::new(InMemoryCacheBackend::new()),
            CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_catalog_lists_are_empty() -> CatalogResult<()> {
        let reader = reader();
        assert!(reader.list_albums().await?.is_empty());
        assert!(reader.list_songs().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_album_without_songs_is_found() -> CatalogResult<()> {
        let reader = reader();
        let album = reader
            .store()
            .album_insert(&NewAlbum {
                title: "Quiet".to_string(),
                description: "no tracks yet".to_string(),
                thumbnail: "https://cdn.example/q.png".to_string(),
            })
            .await?;

        match reader.get_album_with_songs(album.id).await? {
            Lookup::Found(detail) => {
                assert_eq!(detail.album, album);
                assert!(detail.songs.is_empty());
            }
            Lookup::NotFound => panic!("album with no songs must be found"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_list_read_reports_source() -> CatalogResult<()> {
        let reader = reader();
        assert!(reader.list_albums_read().await?.was_cache_miss());
        assert!(reader.list_albums_read().await?.was_cache_hit());
        Ok(())
    }
}

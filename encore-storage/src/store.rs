//! Catalog store trait and in-memory implementation.
//!
//! The store is the source of truth. The Postgres implementation lives in
//! encore-api; `InMemoryCatalogStore` backs tests and local runs.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use encore_core::{
    Album, AlbumId, CatalogId, CatalogResult, NewAlbum, NewSong, Song, SongId, StorageError,
};

/// Async access to the relational catalog.
///
/// Id-keyed reads return `Ok(None)` when no row matches. Errors mean the
/// store itself failed.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // ========================================================================
    // ALBUM OPERATIONS
    // ========================================================================

    /// All albums, in id order.
    async fn album_list(&self) -> CatalogResult<Vec<Album>>;

    /// Get an album by id.
    async fn album_get(&self, id: AlbumId) -> CatalogResult<Option<Album>>;

    /// Insert an album and return the stored row.
    async fn album_insert(&self, album: &NewAlbum) -> CatalogResult<Album>;

    // ========================================================================
    // SONG OPERATIONS
    // ========================================================================

    /// All songs, in id order.
    async fn song_list(&self) -> CatalogResult<Vec<Song>>;

    /// Songs referencing `album_id`, in id order.
    async fn song_list_by_album(&self, album_id: AlbumId) -> CatalogResult<Vec<Song>>;

    /// Get a song by id.
    async fn song_get(&self, id: SongId) -> CatalogResult<Option<Song>>;

    /// Insert a song and return the stored row.
    async fn song_insert(&self, song: &NewSong) -> CatalogResult<Song>;

    /// Check the store is reachable.
    async fn ping(&self) -> CatalogResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Tables {
    albums: BTreeMap<AlbumId, Album>,
    songs: BTreeMap<SongId, Song>,
    next_album: i32,
    next_song: i32,
}

/// In-memory catalog store.
///
/// Assigns ids the way a `SERIAL` column does: starting at 1, never reused.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    tables: RwLock<Tables>,
}

impl InMemoryCatalogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed album, keeping its id.
    pub fn seed_album(&self, album: Album) -> CatalogResult<()> {
        let mut tables = self.write()?;
        tables.next_album = tables.next_album.max(album.id.as_i32());
        tables.albums.insert(album.id, album);
        Ok(())
    }

    /// Insert a fully-formed song, keeping its id.
    pub fn seed_song(&self, song: Song) -> CatalogResult<()> {
        let mut tables = self.write()?;
        tables.next_song = tables.next_song.max(song.id.as_i32());
        tables.songs.insert(song.id, song);
        Ok(())
    }

    /// Delete an album. Songs that referenced it keep existing with no album.
    pub fn delete_album(&self, id: AlbumId) -> CatalogResult<bool> {
        let mut tables = self.write()?;
        let removed = tables.albums.remove(&id).is_some();
        for song in tables.songs.values_mut() {
            if song.album_id == Some(id) {
                song.album_id = None;
            }
        }
        Ok(removed)
    }

    /// Get count of stored albums.
    pub fn album_count(&self) -> CatalogResult<usize> {
        Ok(self.read()?.albums.len())
    }

    /// Get count of stored songs.
    pub fn song_count(&self) -> CatalogResult<usize> {
        Ok(self.read()?.songs.len())
    }

    fn read(&self) -> CatalogResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> CatalogResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn album_list(&self) -> CatalogResult<Vec<Album>> {
        Ok(self.read()?.albums.values().cloned().collect())
    }

    async fn album_get(&self, id: AlbumId) -> CatalogResult<Option<Album>> {
        Ok(self.read()?.albums.get(&id).cloned())
    }

    async fn album_insert(&self, album: &NewAlbum) -> CatalogResult<Album> {
        album.validate()?;
        let mut tables = self.write()?;
        tables.next_album += 1;
        let stored = Album {
            id: AlbumId::new(tables.next_album),
            title: album.title.clone(),
            description: album.description.clone(),
            thumbnail: album.thumbnail.clone(),
            created_at: Utc::now(),
        };
        tables.albums.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn song_list(&self) -> CatalogResult<Vec<Song>> {
        Ok(self.read()?.songs.values().cloned().collect())
    }

    async fn song_list_by_album(&self, album_id: AlbumId) -> CatalogResult<Vec<Song>> {
        Ok(self
            .read()?
            .songs
            .values()
            .filter(|song| song.album_id == Some(album_id))
            .cloned()
            .collect())
    }

    async fn song_get(&self, id: SongId) -> CatalogResult<Option<Song>> {
        Ok(self.read()?.songs.get(&id).cloned())
    }

    async fn song_insert(&self, song: &NewSong) -> CatalogResult<Song> {
        song.validate()?;
        let mut tables = self.write()?;
        if !tables.albums.contains_key(&song.album_id) {
            return Err(StorageError::InsertFailed {
                table: "songs".to_string(),
                reason: format!("album {} does not exist", song.album_id),
            }
            .into());
        }
        tables.next_song += 1;
        let stored = Song {
            id: SongId::new(tables.next_song),
            title: song.title.clone(),
            description: song.description.clone(),
            thumbnail: song.thumbnail.clone(),
            audio: song.audio.clone(),
            album_id: Some(song.album_id),
            created_at: Utc::now(),
        };
        tables.songs.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

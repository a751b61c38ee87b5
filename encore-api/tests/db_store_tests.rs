//! Postgres catalog store tests.
//!
//! Need a reachable database configured through `ENCORE_DB_*`.

#![cfg(feature = "db-tests")]

use std::sync::Arc;

use encore_api::{ApiResult, CachedCatalog, DbClient, DbConfig};
use encore_core::{CatalogError, Lookup, ValidationError};
use encore_storage::{CacheConfig, CatalogStore, InMemoryCacheBackend};
use encore_test_utils::fixtures::{new_album, new_song};

async fn test_db() -> ApiResult<DbClient> {
    let db = DbClient::from_config(&DbConfig::from_env())?;
    db.init_schema().await?;
    Ok(db)
}

#[tokio::test]
async fn test_insert_and_read_back_album() -> ApiResult<()> {
    let db = test_db().await?;
    let created = db.album_insert(&new_album("db roundtrip")).await?;

    let fetched = db.album_get(created.id).await?;
    assert_eq!(fetched.as_ref().map(|a| &a.title), Some(&created.title));
    assert!(db.album_list().await?.iter().any(|a| a.id == created.id));
    Ok(())
}

#[tokio::test]
async fn test_songs_filtered_by_album() -> ApiResult<()> {
    let db = test_db().await?;
    let album = db.album_insert(&new_album("db songs")).await?;
    let song = db.song_insert(&new_song("db track", album.id)).await?;

    let songs = db.song_list_by_album(album.id).await?;
    assert_eq!(songs, vec![song.clone()]);
    assert_eq!(db.song_get(song.id).await?, Some(song));
    Ok(())
}

#[tokio::test]
async fn test_song_insert_with_unknown_album_is_missing_reference() -> ApiResult<()> {
    let db = test_db().await?;
    let missing = encore_core::AlbumId::from(i32::MAX);
    let result = db.song_insert(&new_song("nowhere", missing)).await;
    assert!(matches!(
        result,
        Err(CatalogError::Validation(ValidationError::MissingReference { .. }))
    ));
    Ok(())
}

#[tokio::test]
async fn test_cached_catalog_over_postgres() -> ApiResult<()> {
    let db = test_db().await?;
    let catalog = CachedCatalog::new(
        Arc::new(db),
        Arc::new(InMemoryCacheBackend::new()),
        CacheConfig::default(),
    );

    let album = catalog.create_album(&new_album("db cached")).await?;
    let detail = catalog.album_with_songs(album.id).await?;
    assert!(matches!(detail, Lookup::Found(ref d) if d.songs.is_empty()));

    catalog.create_song(&new_song("db cached track", album.id)).await?;
    let detail = catalog.album_with_songs(album.id).await?;
    assert_eq!(detail.into_option().map(|d| d.songs.len()), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_ping() -> ApiResult<()> {
    let db = test_db().await?;
    db.ping().await?;
    Ok(())
}

//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres and the catalog
//! store backed by it. Every query is parameterized.

use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use encore_core::{
    Album, AlbumId, CatalogError, CatalogId, CatalogResult, NewAlbum, NewSong, Song, SongId,
    StorageError, Timestamp, ValidationError,
};
use encore_storage::CatalogStore;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

/// Catalog tables. Idempotent.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS album (
    id SERIAL PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    description VARCHAR(255) NOT NULL,
    thumbnail VARCHAR(255) NOT NULL,
    created_at TIMESTAMP DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS songs (
    id SERIAL PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    description VARCHAR(255) NOT NULL,
    thumbnail VARCHAR(255),
    audio VARCHAR(255) NOT NULL,
    album_id INT REFERENCES album(id) ON DELETE SET NULL,
    created_at TIMESTAMP DEFAULT NOW()
);
";

const ALBUM_COLUMNS: &str = "id, title, description, thumbnail, created_at";
const SONG_COLUMNS: &str = "id, title, description, thumbnail, audio, album_id, created_at";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "encore".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ENCORE_DB_HOST`, `ENCORE_DB_PORT`, `ENCORE_DB_NAME`
    /// - `ENCORE_DB_USER`, `ENCORE_DB_PASSWORD`
    /// - `ENCORE_DB_POOL_SIZE` (default: 16)
    /// - `ENCORE_DB_TIMEOUT` seconds (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("ENCORE_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("ENCORE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("ENCORE_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("ENCORE_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("ENCORE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("ENCORE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("ENCORE_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_config.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_config);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// DATABASE CLIENT
// ============================================================================

/// Postgres-backed catalog store.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create the catalog tables if they do not exist.
    pub async fn init_schema(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA).await?;
        tracing::info!("Database initialized");
        Ok(())
    }

    async fn get_conn(&self) -> CatalogResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            tracing::error!("Connection pool error: {:?}", e);
            StorageError::Unavailable {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Run a store operation and record its outcome.
    async fn observe<T, F>(&self, operation: &'static str, query: F) -> CatalogResult<T>
    where
        F: Future<Output = CatalogResult<T>>,
    {
        let start = Instant::now();
        let result = query.await;
        if let Some(metrics) = metrics() {
            metrics.record_store_query(operation, result.is_ok(), start.elapsed().as_secs_f64());
        }
        result
    }
}

#[async_trait]
impl CatalogStore for DbClient {
    async fn album_list(&self) -> CatalogResult<Vec<Album>> {
        self.observe("album_list", async {
            let conn = self.get_conn().await?;
            let sql = format!("SELECT {ALBUM_COLUMNS} FROM album ORDER BY id");
            let rows = conn.query(sql.as_str(), &[]).await.map_err(query_failed)?;
            rows.iter().map(album_from_row).collect()
        })
        .await
    }

    async fn album_get(&self, id: AlbumId) -> CatalogResult<Option<Album>> {
        self.observe("album_get", async {
            let conn = self.get_conn().await?;
            let raw = id.as_i32();
            let sql = format!("SELECT {ALBUM_COLUMNS} FROM album WHERE id = $1");
            let row = conn
                .query_opt(sql.as_str(), &[&raw])
                .await
                .map_err(query_failed)?;
            row.as_ref().map(album_from_row).transpose()
        })
        .await
    }

    async fn album_insert(&self, album: &NewAlbum) -> CatalogResult<Album> {
        album.validate()?;
        self.observe("album_insert", async {
            let conn = self.get_conn().await?;
            let sql = format!(
                "INSERT INTO album (title, description, thumbnail) VALUES ($1, $2, $3) \
                 RETURNING {ALBUM_COLUMNS}"
            );
            let row = conn
                .query_one(
                    sql.as_str(),
                    &[&album.title, &album.description, &album.thumbnail],
                )
                .await
                .map_err(|e| insert_failed("album", e))?;
            album_from_row(&row)
        })
        .await
    }

    async fn song_list(&self) -> CatalogResult<Vec<Song>> {
        self.observe("song_list", async {
            let conn = self.get_conn().await?;
            let sql = format!("SELECT {SONG_COLUMNS} FROM songs ORDER BY id");
            let rows = conn.query(sql.as_str(), &[]).await.map_err(query_failed)?;
            rows.iter().map(song_from_row).collect()
        })
        .await
    }

    async fn song_list_by_album(&self, album_id: AlbumId) -> CatalogResult<Vec<Song>> {
        self.observe("song_list_by_album", async {
            let conn = self.get_conn().await?;
            let raw = album_id.as_i32();
            let sql = format!("SELECT {SONG_COLUMNS} FROM songs WHERE album_id = $1 ORDER BY id");
            let rows = conn
                .query(sql.as_str(), &[&raw])
                .await
                .map_err(query_failed)?;
            rows.iter().map(song_from_row).collect()
        })
        .await
    }

    async fn song_get(&self, id: SongId) -> CatalogResult<Option<Song>> {
        self.observe("song_get", async {
            let conn = self.get_conn().await?;
            let raw = id.as_i32();
            let sql = format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = $1");
            let row = conn
                .query_opt(sql.as_str(), &[&raw])
                .await
                .map_err(query_failed)?;
            row.as_ref().map(song_from_row).transpose()
        })
        .await
    }

    async fn song_insert(&self, song: &NewSong) -> CatalogResult<Song> {
        song.validate()?;
        self.observe("song_insert", async {
            let conn = self.get_conn().await?;
            let album_id = song.album_id.as_i32();
            let sql = format!(
                "INSERT INTO songs (title, description, thumbnail, audio, album_id) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {SONG_COLUMNS}"
            );
            let row = conn
                .query_one(
                    sql.as_str(),
                    &[
                        &song.title,
                        &song.description,
                        &song.thumbnail,
                        &song.audio,
                        &album_id,
                    ],
                )
                .await
                .map_err(|e| {
                    if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
                        ValidationError::MissingReference {
                            entity: "album".to_string(),
                            id: song.album_id.to_string(),
                        }
                        .into()
                    } else {
                        insert_failed("songs", e)
                    }
                })?;
            song_from_row(&row)
        })
        .await
    }

    async fn ping(&self) -> CatalogResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1").await.map_err(query_failed)?;
        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn query_failed(err: tokio_postgres::Error) -> CatalogError {
    tracing::error!("Database error: {:?}", err);
    StorageError::Unavailable {
        reason: err.to_string(),
    }
    .into()
}

fn insert_failed(table: &str, err: tokio_postgres::Error) -> CatalogError {
    tracing::error!(table, "Insert failed: {:?}", err);
    StorageError::InsertFailed {
        table: table.to_string(),
        reason: err.to_string(),
    }
    .into()
}

fn column<'a, T>(row: &'a Row, table: &str, name: &str) -> CatalogResult<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name).map_err(|e| {
        StorageError::MalformedRow {
            table: table.to_string(),
            reason: format!("{name}: {e}"),
        }
        .into()
    })
}

/// `created_at` is a nullable `TIMESTAMP` holding UTC wall time.
fn created_at(row: &Row, table: &str) -> CatalogResult<Timestamp> {
    let value: Option<NaiveDateTime> = column(row, table, "created_at")?;
    value.map(|naive| naive.and_utc()).ok_or_else(|| {
        StorageError::MalformedRow {
            table: table.to_string(),
            reason: "created_at is null".to_string(),
        }
        .into()
    })
}

fn album_from_row(row: &Row) -> CatalogResult<Album> {
    Ok(Album {
        id: AlbumId::new(column(row, "album", "id")?),
        title: column(row, "album", "title")?,
        description: column(row, "album", "description")?,
        thumbnail: column(row, "album", "thumbnail")?,
        created_at: created_at(row, "album")?,
    })
}

fn song_from_row(row: &Row) -> CatalogResult<Song> {
    let album_id: Option<i32> = column(row, "songs", "album_id")?;
    Ok(Song {
        id: SongId::new(column(row, "songs", "id")?),
        title: column(row, "songs", "title")?,
        description: column(row, "songs", "description")?,
        thumbnail: column(row, "songs", "thumbnail")?,
        audio: column(row, "songs", "audio")?,
        album_id: album_id.map(AlbumId::new),
        created_at: created_at(row, "songs")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_default() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "encore");
        assert_eq!(config.max_size, 16);
    }

    #[tokio::test]
    async fn test_create_pool_is_lazy() -> ApiResult<()> {
        // deadpool connects on first use, so no server is needed here
        let client = DbClient::from_config(&DbConfig::default())?;
        assert_eq!(client.pool_size(), 0);
        Ok(())
    }

    #[test]
    fn test_schema_declares_both_tables() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS album"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS songs"));
        assert!(SCHEMA.contains("ON DELETE SET NULL"));
    }
}

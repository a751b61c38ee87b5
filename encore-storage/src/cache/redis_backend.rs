//! Redis cache backend.
//!
//! Wraps a `redis::aio::ConnectionManager`, which multiplexes one connection
//! across callers and reconnects after failures. The backend is an explicit
//! object: `connect` acquires the connection and `disconnect` (or drop)
//! releases it. Nothing is held in process-wide state.

use std::time::Duration;

use async_trait::async_trait;
use encore_core::CacheError;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tracing::info;

use super::traits::CacheBackend;

/// Redis-backed cache using `GET`, `SET .. PX` and `DEL`.
#[derive(Clone)]
pub struct RedisCacheBackend {
    conn: ConnectionManager,
    /// Connection URL with credentials stripped, for logs.
    endpoint: String,
}

impl std::fmt::Debug for RedisCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheBackend")
            .field("endpoint", &self.endpoint)
            .field("conn", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCacheBackend {
    /// Connect to Redis.
    ///
    /// Fails fast: one retry, bounded by `connect_timeout`. Callers that can
    /// run without a cache should fall back to another backend on error.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(connect_timeout);

        let conn = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(unavailable)?;

        let endpoint = redact(url);
        info!(endpoint = %endpoint, "Connected to Redis cache");
        Ok(Self { conn, endpoint })
    }

    /// Release the connection.
    pub fn disconnect(self) {
        info!(endpoint = %self.endpoint, "Disconnecting Redis cache");
        drop(self.conn);
    }

    /// Connection URL with credentials stripped.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // PX rejects 0; sub-millisecond TTLs round up.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        conn.pset_ex::<_, _, ()>(key, value, millis)
            .await
            .map_err(unavailable)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(unavailable)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::Unavailable {
        reason: err.to_string(),
    }
}

/// Strip `user:password@` from a connection URL.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

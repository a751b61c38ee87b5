//! Cache backend trait and statistics.
//!
//! This module defines the trait that cache backends implement. Backends
//! store opaque bytes under text keys; serialization and key derivation
//! belong to the read-through layer.

use std::time::Duration;

use async_trait::async_trait;
use encore_core::CacheError;

/// Cache backend trait for pluggable cache implementations.
///
/// Implementations must be thread-safe and support concurrent access.
/// "Absent" is `Ok(None)`; an unreachable or failing backend is `Err`, so
/// callers can tell a miss from an outage.
///
/// # Expiry
///
/// `set` carries a TTL. After it elapses, `get` must return `Ok(None)`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the bytes stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), CacheError>;

    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;
}

/// Statistics about read-through cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from the cache.
    pub hits: u64,
    /// Reads that found nothing usable in the cache.
    pub misses: u64,
    /// Misses answered by another caller's in-flight store read.
    pub coalesced: u64,
    /// Store queries issued on behalf of the cache.
    pub store_reads: u64,
    /// Backend failures, timeouts and undecodable entries.
    pub errors: u64,
    /// Populates skipped because an invalidation raced the store read.
    pub populates_skipped: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Coalesced reads count as hits.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.coalesced;
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 70,
            coalesced: 10,
            misses: 30,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}

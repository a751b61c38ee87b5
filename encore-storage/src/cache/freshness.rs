//! Read metadata carried alongside cached values.
//!
//! Every read through the cache says where its value came from and when
//! that value was produced, so staleness is visible to the caller instead
//! of hidden behind the cache.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Where a read's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadSource {
    /// Served from a live cache entry.
    Cache,
    /// Fetched from the catalog store by this caller.
    Store,
    /// Shared from another caller's in-flight store read for the same key.
    Coalesced,
}

impl ReadSource {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadSource::Cache => "hit",
            ReadSource::Store => "miss",
            ReadSource::Coalesced => "coalesced",
        }
    }
}

/// Result of a read through the cache, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// When the value was read from the store.
    cached_at: DateTime<Utc>,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    /// Create a read answered by a cache entry written at `cached_at`.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            source: ReadSource::Cache,
        }
    }

    /// Create a read answered by this caller's own store query.
    pub fn from_store(value: T) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            source: ReadSource::Store,
        }
    }

    /// Create a read answered by a concurrent caller's store query.
    pub fn coalesced(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            source: ReadSource::Coalesced,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Where the value came from.
    pub fn source(&self) -> ReadSource {
        self.source
    }

    /// Check if this was a cache hit.
    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    /// Check if the store was queried for this read (by this or another caller).
    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit()
    }

    /// Get when the value was read from the store.
    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// How long ago the value was read from the store.
    pub fn staleness(&self) -> Duration {
        (Utc::now() - self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            source: self.source,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_read_from_cache() {
        let cached_at = Utc::now();
        let read = CacheRead::from_cache("value", cached_at);

        assert!(read.was_cache_hit());
        assert!(!read.was_cache_miss());
        assert_eq!(read.source().as_str(), "hit");
        assert_eq!(read.cached_at(), cached_at);
    }

    #[test]
    fn test_cache_read_from_store() {
        let read = CacheRead::from_store(42i32);

        assert!(read.was_cache_miss());
        assert_eq!(read.source(), ReadSource::Store);
        assert_eq!(read.into_value(), 42);
    }

    #[test]
    fn test_coalesced_counts_as_miss() {
        let read = CacheRead::coalesced((), Utc::now());
        assert!(read.was_cache_miss());
        assert_eq!(read.source().as_str(), "coalesced");
    }

    #[test]
    fn test_cache_read_staleness() {
        let past = Utc::now() - chrono::Duration::seconds(5);
        let read = CacheRead::from_cache("test", past);

        let staleness = read.staleness();
        assert!(staleness >= Duration::from_secs(4));
        assert!(staleness <= Duration::from_secs(10));
    }

    #[test]
    fn test_cache_read_map_keeps_metadata() {
        let cached_at = Utc::now();
        let mapped = CacheRead::from_cache(21, cached_at).map(|v| v * 2);

        assert!(mapped.was_cache_hit());
        assert_eq!(mapped.cached_at(), cached_at);
        assert_eq!(mapped.into_value(), 42);
    }
}

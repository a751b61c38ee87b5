//! In-process cache backend.
//!
//! Used when no Redis URL is configured and throughout the test suite.
//! Entries expire lazily: an expired entry is dropped on the next `get`
//! and can be swept in bulk with [`InMemoryCacheBackend::purge_expired`].
//!
//! Deadlines use `tokio::time::Instant`, so tests can drive expiry with a
//! paused clock.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use encore_core::CacheError;
use tokio::time::Instant;

use super::traits::CacheBackend;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// DashMap-backed cache with per-entry deadlines.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<String, Entry>,
}

impl InMemoryCacheBackend {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if a live entry exists for `key`.
    pub fn contains_live(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired: remove only if nobody refreshed it in between.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() -> Result<(), CacheError> {
        let cache = InMemoryCacheBackend::new();
        assert_eq!(cache.get("k").await?, None);

        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await?;
        assert_eq!(cache.get("k").await?, Some(b"v".to_vec()));

        cache.delete("k").await?;
        assert_eq!(cache.get("k").await?, None);

        // Deleting an absent key is a no-op.
        cache.delete("k").await?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() -> Result<(), CacheError> {
        let cache = InMemoryCacheBackend::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(5)).await?;

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.contains_live("k"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").await?, None);
        assert!(cache.is_empty(), "expired entry should be dropped on read");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() -> Result<(), CacheError> {
        let cache = InMemoryCacheBackend::new();
        cache.set("short", b"1".to_vec(), Duration::from_secs(1)).await?;
        cache.set("long", b"2".to_vec(), Duration::from_secs(60)).await?;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_live("long"));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_replaces_existing() -> Result<(), CacheError> {
        let cache = InMemoryCacheBackend::new();
        cache.set("k", b"old".to_vec(), Duration::from_secs(60)).await?;
        cache.set("k", b"new".to_vec(), Duration::from_secs(60)).await?;
        assert_eq!(cache.get("k").await?, Some(b"new".to_vec()));
        assert_eq!(cache.len(), 1);
        Ok(())
    }
}

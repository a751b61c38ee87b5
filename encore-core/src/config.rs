//! Configuration types

use std::time::Duration;

/// Cache settings shared by the storage layer and the API binary.
///
/// Loaded from environment variables with development defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Redis connection URL. `None` selects the in-process backend.
    pub redis_url: Option<String>,
    /// Lifetime of a positive cache entry.
    pub entry_ttl: Duration,
    /// Lifetime of a cached "not found". `None` disables negative caching.
    pub negative_ttl: Option<Duration>,
    /// How long a concurrent miss waits on the in-flight read for the same key.
    pub stampede_wait: Duration,
    /// Upper bound on any single cache get/set/delete.
    pub op_timeout: Duration,
    /// Namespace prepended to every key.
    pub key_prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            entry_ttl: Duration::from_secs(300),
            negative_ttl: None,
            stampede_wait: Duration::from_millis(250),
            op_timeout: Duration::from_millis(100),
            key_prefix: "encore:".to_string(),
        }
    }
}

impl CacheSettings {
    /// Create CacheSettings from environment variables.
    ///
    /// Environment variables:
    /// - `ENCORE_REDIS_URL`: Redis URL (unset = in-process cache)
    /// - `ENCORE_CACHE_TTL_SECS`: Entry lifetime (default: 300)
    /// - `ENCORE_CACHE_NEGATIVE_TTL_SECS`: Not-found lifetime (unset or 0 = disabled)
    /// - `ENCORE_CACHE_STAMPEDE_WAIT_MS`: Wait on in-flight reads (default: 250)
    /// - `ENCORE_CACHE_OP_TIMEOUT_MS`: Per-operation timeout (default: 100)
    /// - `ENCORE_CACHE_KEY_PREFIX`: Key namespace (default: "encore:")
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let redis_url = std::env::var("ENCORE_REDIS_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let entry_ttl = env_u64("ENCORE_CACHE_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.entry_ttl);

        let negative_ttl = env_u64("ENCORE_CACHE_NEGATIVE_TTL_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let stampede_wait = env_u64("ENCORE_CACHE_STAMPEDE_WAIT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.stampede_wait);

        let op_timeout = env_u64("ENCORE_CACHE_OP_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.op_timeout);

        let key_prefix =
            std::env::var("ENCORE_CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix);

        Self {
            redis_url,
            entry_ttl,
            negative_ttl,
            stampede_wait,
            op_timeout,
            key_prefix,
        }
    }

    /// Returns true if a "not found" result may be cached.
    pub fn negative_caching_enabled(&self) -> bool {
        self.negative_ttl.is_some()
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = CacheSettings::default();
        assert_eq!(settings.redis_url, None);
        assert_eq!(settings.entry_ttl, Duration::from_secs(300));
        assert!(!settings.negative_caching_enabled());
        assert_eq!(settings.stampede_wait, Duration::from_millis(250));
        assert_eq!(settings.op_timeout, Duration::from_millis(100));
        assert_eq!(settings.key_prefix, "encore:");
    }

    #[test]
    fn test_negative_caching_toggle() {
        let settings = CacheSettings {
            negative_ttl: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        assert!(settings.negative_caching_enabled());
    }
}

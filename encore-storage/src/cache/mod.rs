//! Cache layer for catalog reads.
//!
//! Values live in a TTL-capable key-value backend (Redis in production, an
//! in-process map otherwise) and are always disposable: the catalog store
//! is the source of truth and every entry can be recomputed from it.
//!
//! # Consistency
//!
//! Entries are bounded-stale. They expire with their TTL and write paths
//! invalidate the keys they affect. A store read that overlaps an
//! invalidation does not write its result back, so a read racing a write
//! cannot re-populate pre-write data.
//!
//! # Failure
//!
//! The cache never fails a read. Backend errors and timeouts are logged and
//! treated as misses.
//!
//! # Example
//!
//! ```ignore
//! let cache = ReadThroughCache::new(backend, CacheConfig::default());
//! let read = cache.get(&CacheKey::song_detail(id), &fetcher).await?;
//! if read.was_cache_hit() {
//!     tracing::debug!(staleness = ?read.staleness(), "served from cache");
//! }
//! ```

pub mod freshness;
pub mod key;
pub mod memory_backend;
pub mod read_through;
pub mod redis_backend;
pub mod traits;

pub use freshness::{CacheRead, ReadSource};
pub use key::CacheKey;
pub use memory_backend::InMemoryCacheBackend;
pub use read_through::{CacheConfig, FnFetcher, ReadThroughCache, StorageFetcher};
pub use redis_backend::RedisCacheBackend;
pub use traits::{CacheBackend, CacheStats};

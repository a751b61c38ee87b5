//! ENCORE Storage - Catalog Store and Cache-Aside Reads
//!
//! Defines the catalog store abstraction and the cache that sits in front
//! of it. The Postgres store lives in encore-api.

pub mod cache;
pub mod reader;
pub mod store;

pub use reader::CatalogReader;
pub use store::{CatalogStore, InMemoryCatalogStore};

// Re-export cache types for API integration
pub use cache::{
    CacheBackend, CacheConfig, CacheKey, CacheRead, CacheStats, FnFetcher, InMemoryCacheBackend,
    ReadSource, ReadThroughCache, RedisCacheBackend, StorageFetcher,
};

//! ENCORE API - REST Layer for the Music Catalog
//!
//! Axum routes for albums and songs. Reads go through the cache-aside
//! catalog reader in encore-storage; admin writes go to Postgres and
//! invalidate the affected cache keys.

pub mod cached_db;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod telemetry;

// Re-export commonly used types
pub use cached_db::{CachedCatalog, DynCatalogStore};
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{
    admin_middleware, AdminGuardState, AdminUser, HttpUserDirectory, UserDirectory, UserProfile,
};
pub use routes::create_api_router;

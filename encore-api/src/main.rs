use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use encore_api::telemetry::{init_tracer, TelemetryConfig};
use encore_api::{
    create_api_router, AdminGuardState, ApiConfig, ApiError, ApiResult, CachedCatalog, DbClient,
    DbConfig, HttpUserDirectory,
};
use encore_core::CacheSettings;
use encore_storage::{CacheBackend, CacheConfig, InMemoryCacheBackend, RedisCacheBackend};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;
    db.init_schema().await?;

    let cache_settings = CacheSettings::from_env();
    let backend = connect_cache(&cache_settings).await;
    let catalog = Arc::new(CachedCatalog::new(
        Arc::new(db),
        backend,
        CacheConfig::from(cache_settings),
    ));

    let api_config = ApiConfig::from_env();
    let guard = AdminGuardState::new(Arc::new(HttpUserDirectory::new(&api_config)?));

    let app: Router = create_api_router(catalog, guard, &api_config);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting ENCORE API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    Ok(())
}

/// Redis when configured and reachable, otherwise the in-process cache.
async fn connect_cache(settings: &CacheSettings) -> Arc<dyn CacheBackend> {
    let Some(url) = settings.redis_url.as_deref() else {
        tracing::info!("No ENCORE_REDIS_URL set, using in-process cache");
        return Arc::new(InMemoryCacheBackend::new());
    };

    match RedisCacheBackend::connect(url, REDIS_CONNECT_TIMEOUT).await {
        Ok(redis) => {
            tracing::info!(endpoint = redis.endpoint(), "Using Redis cache");
            Arc::new(redis)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, falling back to in-process cache");
            Arc::new(InMemoryCacheBackend::new())
        }
    }
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("ENCORE_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("ENCORE_API_PORT").ok())
        .unwrap_or_else(|| "8000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}

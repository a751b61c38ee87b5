//! REST API Routes Module
//!
//! Catalog routes are mounted under `/api/v1`:
//! - `/album/all`, `/album/:id`, `/album/new` (admin)
//! - `/song/all`, `/song/:id`, `/song/new` (admin)
//!
//! Plus `/health/*` and `/metrics`.

pub mod album;
pub mod health;
pub mod song;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::rejection::JsonRejection,
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Json, Router,
};
use encore_core::CatalogId;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::cached_db::CachedCatalog;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AdminGuardState, TOKEN_HEADER};
use crate::telemetry::{metrics_handler, observability_middleware};

pub use album::create_router as album_router;
pub use health::create_router as health_router;
pub use song::create_router as song_router;

/// Build the complete application router.
pub fn create_api_router(
    catalog: Arc<CachedCatalog>,
    guard: AdminGuardState,
    config: &ApiConfig,
) -> Router {
    let api = Router::new()
        .nest("/album", album_router(catalog.clone(), guard.clone()))
        .nest("/song", song_router(catalog.clone(), guard));

    let metrics = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(catalog.clone());

    Router::new()
        .nest("/api/v1", api)
        .nest("/health", health_router(catalog))
        .merge(metrics)
        .layer(from_fn(observability_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(config.request_timeout)),
        )
        .layer(build_cors_layer(config))
}

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(TOKEN_HEADER),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        return cors.allow_origin(Any);
    }

    tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    // Credentials are only valid with an explicit origin list
    cors.allow_origin(origins)
        .allow_credentials(config.cors_allow_credentials)
}

/// Parse a path id, rejecting anything that is not an integer.
pub(crate) fn parse_id<I>(raw: &str) -> ApiResult<I>
where
    I: CatalogId + FromStr,
{
    raw.parse()
        .map_err(|_| ApiError::invalid_format(&format!("{} id", I::ENTITY), "an integer"))
}

/// Unwrap a JSON body, reporting malformed input as 400.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_input(rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_core::{AlbumId, SongId};

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id::<AlbumId>("7").ok(), Some(AlbumId::new(7)));
        assert!(parse_id::<SongId>("seven").is_err());
        assert!(parse_id::<SongId>("").is_err());
    }

    #[test]
    fn test_parse_id_error_names_entity() {
        let err = parse_id::<AlbumId>("x").err().map(|e| e.message);
        assert!(err.is_some_and(|m| m.contains("album id")));
    }
}

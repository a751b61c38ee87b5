//! Album REST API Routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use encore_core::{Album, AlbumId, AlbumWithSongs, NewAlbum};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{json_body, parse_id};
use crate::cached_db::CachedCatalog;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{admin_middleware, AdminGuardState, AdminUser};

/// Body returned by `POST /album/new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumCreated {
    pub message: String,
    pub album: Album,
}

/// GET /api/v1/album/all
pub async fn list_albums(
    State(catalog): State<Arc<CachedCatalog>>,
) -> ApiResult<Json<Vec<Album>>> {
    Ok(Json(catalog.list_albums().await?))
}

/// GET /api/v1/album/:id - the album and every song in it
pub async fn get_album(
    State(catalog): State<Arc<CachedCatalog>>,
    Path(id): Path<String>,
) -> ApiResult<Json<AlbumWithSongs>> {
    let id: AlbumId = parse_id(&id)?;
    catalog
        .album_with_songs(id)
        .await?
        .into_option()
        .map(Json)
        .ok_or_else(ApiError::album_not_found)
}

/// POST /api/v1/album/new (admin)
pub async fn create_album(
    State(catalog): State<Arc<CachedCatalog>>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<NewAlbum>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = json_body(payload)?;
    let album = catalog.create_album(&req).await?;
    tracing::info!(album_id = %album.id, admin = %admin.id, "Album added by admin");
    Ok((
        StatusCode::CREATED,
        Json(AlbumCreated {
            message: "Album created successfully".to_string(),
            album,
        }),
    ))
}

/// Album routes. Writes require an admin.
pub fn create_router(catalog: Arc<CachedCatalog>, guard: AdminGuardState) -> Router {
    let admin = Router::new()
        .route("/new", post(create_album))
        .route_layer(from_fn_with_state(guard, admin_middleware));

    Router::new()
        .route("/all", get(list_albums))
        .route("/:id", get(get_album))
        .merge(admin)
        .with_state(catalog)
}

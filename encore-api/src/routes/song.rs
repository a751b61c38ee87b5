//! Song REST API Routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use encore_core::{NewSong, Song, SongId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{json_body, parse_id};
use crate::cached_db::CachedCatalog;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{admin_middleware, AdminGuardState, AdminUser};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongAdded {
    pub message: String,
    pub song: Song,
}

/// GET /api/v1/song/all
pub async fn list_songs(State(catalog): State<Arc<CachedCatalog>>) -> ApiResult<Json<Vec<Song>>> {
    Ok(Json(catalog.list_songs().await?))
}

/// GET /api/v1/song/:id
pub async fn get_song(
    State(catalog): State<Arc<CachedCatalog>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Song>> {
    let id: SongId = parse_id(&id)?;
    catalog
        .song(id)
        .await?
        .into_option()
        .map(Json)
        .ok_or_else(ApiError::song_not_found)
}

/// POST /api/v1/song/new (admin)
///
/// Accepts `album` or `album_id` for the owning album.
pub async fn create_song(
    State(catalog): State<Arc<CachedCatalog>>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<NewSong>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = json_body(payload)?;
    let song = catalog.create_song(&req).await?;
    tracing::info!(song_id = %song.id, admin = %admin.id, "Song added by admin");
    Ok((
        StatusCode::CREATED,
        Json(SongAdded {
            message: "Song Added".to_string(),
            song,
        }),
    ))
}

pub fn create_router(catalog: Arc<CachedCatalog>, guard: AdminGuardState) -> Router {
    let admin = Router::new()
        .route("/new", post(create_song))
        .route_layer(from_fn_with_state(guard, admin_middleware));

    Router::new()
        .route("/all", get(list_songs))
        .route("/:id", get(get_song))
        .merge(admin)
        .with_state(catalog)
}

//! Admin guard for catalog write routes.
//!
//! Requests carry an opaque session token in the `token` header. The guard
//! resolves it against the user service and admits only users whose role
//! is `admin`:
//! - Missing token, or a token the user service rejects: 403
//! - Resolved user without the admin role: 401

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult, ErrorCode};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "token";

const ADMIN_ROLE: &str = "admin";

// ============================================================================
// USER DIRECTORY
// ============================================================================

/// User record returned by the user service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Resolves session tokens to users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// The user owning `token`. Any failure is reported as `Forbidden`.
    async fn current_user(&self, token: &str) -> ApiResult<UserProfile>;
}

/// User directory backed by the user service's `/api/v1/user/me`.
pub struct HttpUserDirectory {
    client: reqwest::Client,
    me_url: String,
}

impl HttpUserDirectory {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.user_lookup_timeout)
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            me_url: config.user_me_url(),
        })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn current_user(&self, token: &str) -> ApiResult<UserProfile> {
        let response = self
            .client
            .get(&self.me_url)
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                tracing::warn!(error = %e, url = %self.me_url, "User lookup failed");
                ApiError::from_code(ErrorCode::Forbidden)
            })?;

        response.json::<UserProfile>().await.map_err(|e| {
            tracing::warn!(error = %e, "User service returned an unreadable profile");
            ApiError::from_code(ErrorCode::Forbidden)
        })
    }
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Shared state for the admin guard.
#[derive(Clone)]
pub struct AdminGuardState {
    directory: Arc<dyn UserDirectory>,
}

impl AdminGuardState {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

/// Admit only admins. Inserts [`AdminUser`] into request extensions.
pub async fn admin_middleware(
    State(state): State<AdminGuardState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::from_code(ErrorCode::Forbidden))?;

    let user = state.directory.current_user(&token).await?;
    if !user.is_admin() {
        tracing::debug!(user_id = %user.id, role = %user.role, "Admin route denied");
        return Err(ApiError::from_code(ErrorCode::Unauthorized));
    }

    request.extensions_mut().insert(AdminUser(user));
    Ok(next.run(request).await)
}

/// The admin admitted by [`admin_middleware`].
#[derive(Debug, Clone)]
pub struct AdminUser(pub UserProfile);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminUser>()
            .cloned()
            .ok_or_else(|| {
                ApiError::internal_error(
                    "AdminUser not found in request extensions. \
                     Ensure admin_middleware is applied to this route.",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_deserializes_user_service_shape() -> Result<(), serde_json::Error> {
        let body = r#"{
            "_id": "66a1",
            "name": "Ada",
            "email": "ada@example.com",
            "role": "admin",
            "playlist": ["1", "2"]
        }"#;
        let user: UserProfile = serde_json::from_str(body)?;
        assert_eq!(user.id, "66a1");
        assert!(user.is_admin());
        Ok(())
    }

    #[test]
    fn test_profile_without_role_is_not_admin() -> Result<(), serde_json::Error> {
        let user: UserProfile = serde_json::from_str(r#"{"_id": "1", "name": "Bo"}"#)?;
        assert!(!user.is_admin());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_user_service_is_forbidden() -> ApiResult<()> {
        let config = ApiConfig {
            // Port 9 (discard) on loopback refuses connections
            user_service_url: "http://127.0.0.1:9".to_string(),
            user_lookup_timeout: std::time::Duration::from_millis(500),
            ..ApiConfig::default()
        };
        let directory = HttpUserDirectory::new(&config)?;
        let err = directory.current_user("abc").await.err().map(|e| e.code);
        assert_eq!(err, Some(ErrorCode::Forbidden));
        Ok(())
    }
}

//! API Configuration Module
//!
//! CORS, request limits, and the user service the admin guard calls.
//! Loaded from environment variables with development defaults.

use std::time::Duration;

/// API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Request Handling
    // ========================================================================
    /// Upper bound on handling a single request.
    pub request_timeout: Duration,

    // ========================================================================
    // User Service
    // ========================================================================
    /// Base URL of the user service. The admin guard calls
    /// `{user_service_url}/api/v1/user/me`.
    pub user_service_url: String,

    /// Timeout for the user lookup made by the admin guard.
    pub user_lookup_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,
            request_timeout: Duration::from_secs(30),
            user_service_url: "http://localhost:5000".to_string(),
            user_lookup_timeout: Duration::from_secs(5),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ENCORE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `ENCORE_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `ENCORE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `ENCORE_REQUEST_TIMEOUT_SECS`: Per-request timeout (default: 30)
    /// - `ENCORE_USER_SERVICE_URL`: User service base URL (default: http://localhost:5000)
    /// - `ENCORE_USER_LOOKUP_TIMEOUT_MS`: Admin guard lookup timeout (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("ENCORE_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("ENCORE_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.cors_allow_credentials);

        let cors_max_age_secs = std::env::var("ENCORE_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let request_timeout = std::env::var("ENCORE_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let user_service_url = std::env::var("ENCORE_USER_SERVICE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.user_service_url);

        let user_lookup_timeout = std::env::var("ENCORE_USER_LOOKUP_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.user_lookup_timeout);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
            request_timeout,
            user_service_url,
            user_lookup_timeout,
        }
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|allowed| allowed == origin)
    }

    /// URL of the "current user" endpoint on the user service.
    pub fn user_me_url(&self) -> String {
        format!("{}/api/v1/user/me", self.user_service_url)
    }
}

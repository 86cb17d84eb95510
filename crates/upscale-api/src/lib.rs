//! Image Upscale API
//!
//! HTTP front for AI image upscaling. Callers upload an image and a scale
//! factor; the image is enhanced by the remote provider and the result URL
//! is returned. Logged-in callers are held to a daily quota.
//!
//! ## Endpoints
//!
//! - `POST /api/upscale` - Enhance an uploaded image (login optional)
//! - `GET /api/download` - Proxy a result download as an attachment
//! - `GET /api/limits` - Report configured limits
//! - `GET /auth/user` - Current user and today's usage (login required)
//! - `GET /auth/logout` - Clear the session cookie
//! - `GET /health` - Health check

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod orchestrator;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use transform_client::{Transformer, DEFAULT_MAX_IMAGE_BYTES};
use upscale_quota::QuotaStore;

pub use auth::TokenSigner;
pub use config::Config;
pub use error::ApiError;
pub use orchestrator::{Enhanced, OrchestrationError, Orchestrator};

/// Room for multipart framing and the `scale` field on top of the image
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Behavioural settings shared by the handlers
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Authenticated daily limit
    pub daily_limit: u32,
    /// Advisory limit for anonymous callers, tracked client-side
    pub anonymous_daily_limit: u32,
    /// Largest accepted upload
    pub max_upload_bytes: usize,
    /// Upper bound on one provider round-trip
    pub provider_timeout: Duration,
    /// Origin allowed to call with credentials
    pub client_url: String,
    /// Mark session cookies `Secure`
    pub secure_cookies: bool,
    /// Return internal error detail to callers
    pub expose_error_details: bool,
    /// Hosts the download proxy may fetch from
    pub download_allowed_hosts: Vec<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            daily_limit: 10,
            anonymous_daily_limit: 2,
            max_upload_bytes: DEFAULT_MAX_IMAGE_BYTES,
            provider_timeout: Duration::from_secs(60),
            client_url: "http://localhost:5173".to_string(),
            secure_cookies: false,
            expose_error_details: false,
            download_allowed_hosts: vec!["res.cloudinary.com".to_string()],
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub quota: Arc<dyn QuotaStore>,
    pub tokens: TokenSigner,
    pub settings: ServiceSettings,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        quota: Arc<dyn QuotaStore>,
        transformer: Arc<dyn Transformer>,
        tokens: TokenSigner,
        settings: ServiceSettings,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            quota.clone(),
            transformer,
            settings.daily_limit,
            settings.provider_timeout,
        );

        Self {
            orchestrator,
            quota,
            tokens,
            http_client: reqwest::Client::builder()
                .timeout(settings.provider_timeout)
                .build()
                .unwrap_or_default(),
            settings,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let cors = cors_layer(&state.settings.client_url);
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/upscale", post(handlers::upscale_handler))
        .route("/api/download", get(handlers::download_handler))
        .route("/api/limits", get(handlers::limits_handler))
        .route("/auth/user", get(handlers::auth_user_handler))
        .route("/auth/logout", get(handlers::logout_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(shared_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(client_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(client_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!("Invalid CLIENT_URL for CORS: {}", client_url);
            layer
        }
    }
}

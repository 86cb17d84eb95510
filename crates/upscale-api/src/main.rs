//! Upscale API Service
//!
//! Accepts image uploads, enhances them through the image provider and
//! enforces a daily quota for logged-in users.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transform_client::{CloudinaryProvider, TransformClient};
use upscale_api::config::QuotaBackend;
use upscale_api::{create_router, AppState, Config, TokenSigner};
use upscale_quota::{Clock, FileQuotaStore, QuotaStore, RedisQuotaStore, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upscale_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Upscale API Service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded - listening on {}",
        config.api_address()
    );

    let clock: Arc<dyn Clock> = Arc::new(
        SystemClock::with_offset_minutes(config.quota_utc_offset_minutes)
            .context("Invalid quota day offset")?,
    );

    // Open the usage store
    let quota: Arc<dyn QuotaStore> = match &config.quota_backend {
        QuotaBackend::File(path) => {
            info!("Usage file: {}", path.display());
            Arc::new(
                FileQuotaStore::open(path, clock)
                    .await
                    .with_context(|| format!("Failed to open usage file {}", path.display()))?,
            )
        }
        QuotaBackend::Redis(url) => {
            info!("Connecting to Redis at {}", url);
            Arc::new(
                RedisQuotaStore::new(url, clock)
                    .await
                    .context("Failed to connect to Redis")?,
            )
        }
    };

    // Image provider
    let provider = CloudinaryProvider::new(config.cloudinary.clone(), config.provider_timeout())
        .context("Failed to build image provider client")?;
    let transformer =
        Arc::new(TransformClient::new(provider).with_max_image_bytes(config.max_upload_bytes));

    // Create application state
    let state = AppState::new(
        quota,
        transformer,
        TokenSigner::new(&config.jwt_secret),
        config.settings(),
    );

    // Create router
    let app = create_router(state);

    // Start server
    let listener = TcpListener::bind(&config.api_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.api_address()))?;

    info!("Upscale API listening on {}", config.api_address());
    info!("Daily limit: {} per user", config.daily_limit);
    info!("API endpoints:");
    info!("  POST /api/upscale - Enhance an image");
    info!("  GET /api/download - Download a result");
    info!("  GET /api/limits - Configured limits");
    info!("  GET /auth/user - Current user and usage");
    info!("  GET /auth/logout - Clear session");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

//! Configuration management for the Upscale API
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use transform_client::CloudinaryConfig;

use crate::ServiceSettings;

/// Minimum length of the token signing secret
const MIN_JWT_SECRET_BYTES: usize = 16;

/// Where usage counters are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaBackend {
    /// JSON file on local disk
    File(PathBuf),
    /// Redis hashes, one per identity
    Redis(String),
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Browser client origin (CORS)
    pub client_url: String,

    /// Token signing secret
    pub jwt_secret: String,

    /// Production mode: secure cookies, no internal error detail
    pub production: bool,

    /// Authenticated uploads per day
    pub daily_limit: u32,

    /// Advisory anonymous uploads per day
    pub anonymous_daily_limit: u32,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,

    /// Usage counter backend
    pub quota_backend: QuotaBackend,

    /// Offset from UTC used to decide when a day starts
    pub quota_utc_offset_minutes: i32,

    /// Image provider account
    pub cloudinary: CloudinaryConfig,

    /// Upper bound on one provider round-trip
    pub provider_timeout_secs: u64,

    /// Hosts the download proxy may fetch from
    pub download_allowed_hosts: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let quota_backend = match env::var("QUOTA_BACKEND")
            .unwrap_or_else(|_| "file".to_string())
            .to_lowercase()
            .as_str()
        {
            "file" => QuotaBackend::File(
                env::var("USAGE_FILE")
                    .unwrap_or_else(|_| "./data/usage.json".to_string())
                    .into(),
            ),
            "redis" => QuotaBackend::Redis(
                env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            ),
            other => anyhow::bail!("Unknown QUOTA_BACKEND: {} (expected file or redis)", other),
        };

        let config = Config {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .context("Invalid API_PORT")?,

            client_url: env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),

            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,

            production: env::var("APP_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),

            daily_limit: env::var("DAILY_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DAILY_LIMIT")?,

            anonymous_daily_limit: env::var("ANONYMOUS_DAILY_LIMIT")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid ANONYMOUS_DAILY_LIMIT")?,

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| "10485760".to_string())
                .parse()
                .context("Invalid MAX_UPLOAD_BYTES")?,

            quota_backend,

            quota_utc_offset_minutes: env::var("QUOTA_UTC_OFFSET_MINUTES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("Invalid QUOTA_UTC_OFFSET_MINUTES")?,

            cloudinary: CloudinaryConfig::from_env(),

            provider_timeout_secs: env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid PROVIDER_TIMEOUT_SECS")?,

            download_allowed_hosts: env::var("DOWNLOAD_ALLOWED_HOSTS")
                .unwrap_or_else(|_| "res.cloudinary.com".to_string())
                .split(',')
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            anyhow::bail!(
                "JWT_SECRET must be at least {} bytes",
                MIN_JWT_SECRET_BYTES
            );
        }

        if self.max_upload_bytes == 0 {
            anyhow::bail!("MAX_UPLOAD_BYTES must be greater than 0");
        }

        if self.provider_timeout_secs == 0 {
            anyhow::bail!("PROVIDER_TIMEOUT_SECS must be greater than 0");
        }

        if self.quota_utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("QUOTA_UTC_OFFSET_MINUTES must be within one day of UTC");
        }

        // Missing provider credentials are reported per request, not at startup
        if !self.cloudinary.is_complete() {
            tracing::warn!(
                "Cloudinary credentials incomplete; upscale requests will fail until CLOUDINARY_* is set"
            );
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Handler-facing settings derived from this configuration
    pub fn settings(&self) -> ServiceSettings {
        ServiceSettings {
            daily_limit: self.daily_limit,
            anonymous_daily_limit: self.anonymous_daily_limit,
            max_upload_bytes: self.max_upload_bytes,
            provider_timeout: self.provider_timeout(),
            client_url: self.client_url.clone(),
            secure_cookies: self.production,
            expose_error_details: !self.production,
            download_allowed_hosts: self.download_allowed_hosts.clone(),
        }
    }
}

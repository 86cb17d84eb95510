//! Cloudinary upload API adapter
//!
//! Uploads the image with an incoming transformation (restore or normalize,
//! then scale) and reads back the stored, transformed asset. This module is
//! the only place provider error text is inspected.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::ProviderFailure;
use crate::provider::{ImageProvider, Pipeline, ProviderImage, UploadRequest};

/// Public Cloudinary API root
pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Cloudinary account settings
#[derive(Clone, Default)]
pub struct CloudinaryConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// API root, overridable for tests
    pub api_base: String,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl CloudinaryConfig {
    pub fn new(cloud_name: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            cloud_name: Some(cloud_name.to_string()),
            api_key: Some(api_key.to_string()),
            api_secret: Some(api_secret.to_string()),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Load from `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY` and
    /// `CLOUDINARY_API_SECRET`. Missing values are kept as `None`.
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            cloud_name: read("CLOUDINARY_CLOUD_NAME"),
            api_key: read("CLOUDINARY_API_KEY"),
            api_secret: read("CLOUDINARY_API_SECRET"),
            api_base: read("CLOUDINARY_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.credentials().is_some()
    }

    fn credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.cloud_name.as_deref()?,
            self.api_key.as_deref()?,
            self.api_secret.as_deref()?,
        ))
    }
}

/// Successful upload response (subset)
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    width: u32,
    height: u32,
    #[serde(default)]
    original_filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`ImageProvider`] backed by the Cloudinary upload API
pub struct CloudinaryProvider {
    config: CloudinaryConfig,
    client: reqwest::Client,
}

impl CloudinaryProvider {
    /// Create a provider whose requests give up after `timeout`
    pub fn new(config: CloudinaryConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &CloudinaryConfig {
        &self.config
    }
}

#[async_trait]
impl ImageProvider for CloudinaryProvider {
    async fn upload(&self, request: UploadRequest<'_>) -> Result<ProviderImage, ProviderFailure> {
        let Some((cloud_name, api_key, api_secret)) = self.config.credentials() else {
            error!("Cloudinary credentials missing; check CLOUDINARY_* configuration");
            return Err(ProviderFailure::CredentialsMissing);
        };

        let transformation = transformation_for(request.pipeline, request.scale.factor());
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[
                ("timestamp", timestamp.as_str()),
                ("transformation", transformation.as_str()),
            ],
            api_secret,
        );

        let data_uri = format!(
            "data:{};base64,{}",
            request.format.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(request.image)
        );

        let form = reqwest::multipart::Form::new()
            .text("file", data_uri)
            .text("api_key", api_key.to_string())
            .text("timestamp", timestamp)
            .text("transformation", transformation.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = format!("{}/{}/image/upload", self.config.api_base, cloud_name);

        info!("[Cloudinary] Uploading image ({})", transformation);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderFailure::Other("provider request timed out".to_string())
                } else {
                    ProviderFailure::Other(format!("provider request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderFailure::Other(format!("failed to read provider response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            debug!("[Cloudinary] {} error: {}", status, message);
            return Err(classify_failure(status.as_u16(), &message));
        }

        let upload: UploadResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderFailure::Other(format!("unexpected provider response: {}", e))
        })?;

        info!("[Cloudinary] Upload success: {}", upload.secure_url);

        Ok(ProviderImage {
            url: upload.secure_url,
            width: upload.width,
            height: upload.height,
            original_filename: upload.original_filename.unwrap_or_else(|| "image".to_string()),
        })
    }
}

/// Incoming transformation chain: first step, then scale both axes
fn transformation_for(pipeline: Pipeline, factor: u8) -> String {
    let first = match pipeline {
        Pipeline::Restore => "e_gen_restore",
        Pipeline::Normalize => "q_auto:best",
    };
    format!("{}/c_scale,h_ih_mul_{},w_iw_mul_{}", first, factor, factor)
}

/// Signature over alphabetically sorted `key=value` pairs followed by the secret
fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Map a Cloudinary error response onto the closed failure set
fn classify_failure(status: u16, message: &str) -> ProviderFailure {
    let lower = message.to_ascii_lowercase();
    // Cloudinary writes both "api_key" and "API key"
    let words = lower.replace('_', " ");

    if lower.contains("too small for gen_restore") {
        ProviderFailure::TooSmallForRestoration
    } else if status == 401
        || status == 403
        || words.contains("invalid api key")
        || words.contains("unknown api key")
        || lower.contains("invalid signature")
    {
        ProviderFailure::CredentialsRejected
    } else if status == 420
        || status == 429
        || lower.contains("rate limit")
        || lower.contains("credits")
    {
        ProviderFailure::Throttled
    } else if status == 413 || lower.contains("file size too large") {
        ProviderFailure::TooLarge
    } else if lower.contains("invalid image file") || lower.contains("unsupported") {
        ProviderFailure::UnsupportedFormat
    } else {
        ProviderFailure::Other(message.to_string())
    }
}

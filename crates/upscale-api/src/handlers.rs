//! API request handlers

use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use upscale_common::{
    EnhancementRequest, Error as CommonError, ImageFormat, ScaleFactor, UsageSummary, UserProfile,
};

use crate::auth::{clear_session_cookie, OptionalIdentity, RequiredIdentity};
use crate::error::ApiError;
use crate::AppState;

/// Default name for downloaded results
const DEFAULT_DOWNLOAD_NAME: &str = "upscaled-image.png";

/// Largest upstream body the download proxy will relay
const MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Successful upscale response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpscaleResponse {
    pub success: bool,
    pub url: String,
    pub original_size: usize,
    pub result_width: u32,
    pub result_height: u32,
    pub file_name: String,
    /// `null` for anonymous callers
    pub usage: Option<UsageSummary>,
}

/// Current user with today's usage
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserProfile,
    pub usage: UsageSummary,
}

#[derive(Debug, Serialize)]
pub struct LimitsResponse {
    pub daily_limit: u32,
    pub anonymous_daily_limit: u32,
    /// Anonymous limits are advisory only; the counter lives with the client
    pub anonymous_enforced: bool,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub url: Option<String>,
    pub filename: Option<String>,
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "upscale-api"
    }))
}

/// Enhance an uploaded image
pub async fn upscale_handler(
    State(state): State<Arc<AppState>>,
    OptionalIdentity(identity): OptionalIdentity,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UpscaleResponse>, ApiError> {
    let multipart = multipart.map_err(|_| ApiError::no_file())?;
    let request = read_upload(multipart, state.settings.max_upload_bytes).await?;
    let original_size = request.size();

    let enhanced = state
        .orchestrator
        .enhance(&identity, request)
        .await
        .map_err(|e| ApiError::from_orchestration(e, state.settings.expose_error_details))?;

    Ok(Json(UpscaleResponse {
        success: true,
        url: enhanced.result.result_url,
        original_size,
        result_width: enhanced.result.result_width,
        result_height: enhanced.result.result_height,
        file_name: enhanced.result.source_file_name,
        usage: enhanced.usage,
    }))
}

/// Pull the `image` and `scale` fields out of the multipart body
async fn read_upload(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<EnhancementRequest, ApiError> {
    let mut image: Option<(Bytes, Option<String>, Option<String>)> = None;
    let mut scale = ScaleFactor::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(ApiError::too_large(max_upload_bytes))
            }
            Err(e) => return Err(ApiError::bad_request("malformed_body", e.body_text())),
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let content_type = field.content_type().map(str::to_string);
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        ApiError::too_large(max_upload_bytes)
                    } else {
                        ApiError::bad_request("malformed_body", e.body_text())
                    }
                })?;
                image = Some((bytes, content_type, file_name));
            }
            Some("scale") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request("malformed_body", e.body_text()))?;
                scale = text.parse().map_err(|e: CommonError| {
                    ApiError::bad_request("invalid_scale", e.to_string())
                })?;
            }
            _ => {}
        }
    }

    let Some((bytes, content_type, file_name)) = image else {
        return Err(ApiError::no_file());
    };
    if bytes.is_empty() {
        return Err(ApiError::no_file());
    }
    if bytes.len() > max_upload_bytes {
        return Err(ApiError::too_large(max_upload_bytes));
    }

    let format = content_type
        .as_deref()
        .ok_or(())
        .and_then(|mime| ImageFormat::from_mime(mime).map_err(|_| ()))
        .map_err(|_| ApiError::unsupported_format())?;

    Ok(EnhancementRequest {
        image: bytes.to_vec(),
        format,
        scale,
        file_name,
    })
}

/// Proxy a result image back to the browser as an attachment
pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let Some(raw_url) = params.url.filter(|u| !u.is_empty()) else {
        return Err(ApiError::bad_request("missing_url", "Missing URL"));
    };

    let url = reqwest::Url::parse(&raw_url)
        .map_err(|_| ApiError::bad_request("invalid_url", "Invalid URL"))?;

    if !is_allowed_download(&url, &state.settings.download_allowed_hosts) {
        warn!("Refusing download from disallowed URL: {}", raw_url);
        return Err(ApiError::bad_request(
            "invalid_url",
            "Downloads are only available for enhanced images",
        ));
    }

    let expose = state.settings.expose_error_details;
    let response = state
        .http_client
        .get(url)
        .send()
        .await
        .map_err(|e| download_failed(&e.to_string(), expose))?;

    if !response.status().is_success() {
        return Err(download_failed(
            &format!("upstream status {}", response.status()),
            expose,
        ));
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("image/png"));

    if let Some(length) = response.content_length() {
        if length > MAX_DOWNLOAD_BYTES {
            return Err(download_failed(
                &format!("upstream body of {} bytes exceeds {}", length, MAX_DOWNLOAD_BYTES),
                expose,
            ));
        }
    }

    let file_name = params
        .filename
        .as_deref()
        .map(sanitize_file_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string());

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    info!("Proxying download from {} as {}", raw_url, file_name);
    let body = Body::from_stream(response.bytes_stream());
    Ok((StatusCode::OK, headers, body).into_response())
}

fn download_failed(internal: &str, expose: bool) -> ApiError {
    ApiError::server(
        StatusCode::INTERNAL_SERVER_ERROR,
        "download_failed",
        "Failed to download image",
        "The image could not be downloaded. Please try again.",
        internal,
        expose,
    )
}

fn is_allowed_download(url: &reqwest::Url, allowed_hosts: &[String]) -> bool {
    if !matches!(url.scheme(), "https" | "http") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    allowed_hosts.iter().any(|allowed| {
        host == allowed
            || host
                .strip_suffix(allowed.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Keep a file name safe to embed in a quoted header parameter
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\' && *c != '/')
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Report configured limits
pub async fn limits_handler(State(state): State<Arc<AppState>>) -> Json<LimitsResponse> {
    Json(LimitsResponse {
        daily_limit: state.settings.daily_limit,
        anonymous_daily_limit: state.settings.anonymous_daily_limit,
        anonymous_enforced: false,
        max_upload_bytes: state.settings.max_upload_bytes,
    })
}

/// Current user and today's usage
pub async fn auth_user_handler(
    State(state): State<Arc<AppState>>,
    RequiredIdentity(user): RequiredIdentity,
) -> Result<Json<UserResponse>, ApiError> {
    let usage = state.quota.get_usage(&user.email).await.map_err(|e| {
        ApiError::internal(
            &format!("quota store: {}", e),
            state.settings.expose_error_details,
        )
    })?;

    Ok(Json(UserResponse {
        usage: usage.summary(state.settings.daily_limit),
        user,
    }))
}

/// Clear the session cookie
pub async fn logout_handler(State(state): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = HeaderValue::from_str(&clear_session_cookie(state.settings.secure_cookies)) {
        headers.insert(header::SET_COOKIE, cookie);
    }

    (
        headers,
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    )
        .into_response()
}

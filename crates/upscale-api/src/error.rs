//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use transform_client::TransformError;
use uuid::Uuid;

use crate::orchestrator::OrchestrationError;

/// API Error type
///
/// Every error carries a short machine-readable `kind` and a message the
/// caller can act on. Server-side failures also carry a correlation id that
/// matches the log line written when the error was created.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub error: String,
    pub message: String,
    pub details: Option<String>,
    pub correlation_id: Option<String>,
    /// Misconfiguration an operator has to fix; retrying cannot help
    pub fatal: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    kind: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.error,
            kind: self.kind,
            message: &self.message,
            details: self.details.as_deref(),
            correlation_id: self.correlation_id.as_deref(),
        };

        (self.status, Json(body)).into_response()
    }
}

impl ApiError {
    fn client(status: StatusCode, kind: &'static str, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            error: error.to_string(),
            message: message.into(),
            details: None,
            correlation_id: None,
            fatal: false,
        }
    }

    pub fn bad_request(kind: &'static str, message: impl Into<String>) -> Self {
        Self::client(StatusCode::BAD_REQUEST, kind, "Bad request", message)
    }

    pub fn no_file() -> Self {
        Self::client(
            StatusCode::BAD_REQUEST,
            "no_file",
            "No image file provided",
            "Attach an image in the `image` field.",
        )
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::client(StatusCode::UNAUTHORIZED, "auth_required", message, message)
    }

    pub fn too_large(limit_bytes: usize) -> Self {
        Self::client(
            StatusCode::PAYLOAD_TOO_LARGE,
            "too_large",
            "File too large",
            format!(
                "Images must be at most {}. Please choose a smaller file.",
                human_size(limit_bytes)
            ),
        )
    }

    pub fn unsupported_format() -> Self {
        Self::client(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_format",
            "Unsupported image format",
            "Please switch to a JPG, PNG or WEBP image.",
        )
    }

    pub fn limit_reached(limit: u32) -> Self {
        Self::client(
            StatusCode::TOO_MANY_REQUESTS,
            "limit_reached",
            "Daily upload limit reached",
            format!(
                "You have reached your daily limit of {} uploads. Please try again tomorrow.",
                limit
            ),
        )
    }

    /// A server-side failure. `internal` is logged with a fresh correlation
    /// id and only returned to the caller when `expose` is set.
    pub fn server(
        status: StatusCode,
        kind: &'static str,
        error: &str,
        message: &str,
        internal: &str,
        expose: bool,
    ) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        error!(
            correlation_id = %correlation_id,
            kind,
            "{}: {}",
            error,
            internal
        );
        Self::with_correlation(status, kind, error, message, internal, expose, correlation_id)
    }

    /// Like [`ApiError::server`], flagged as fatal and logged as such
    fn fatal(kind: &'static str, error: &str, message: &str, internal: &str, expose: bool) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        error!(
            correlation_id = %correlation_id,
            kind,
            fatal = true,
            "FATAL configuration: {}",
            internal
        );
        Self {
            fatal: true,
            ..Self::with_correlation(
                StatusCode::INTERNAL_SERVER_ERROR,
                kind,
                error,
                message,
                internal,
                expose,
                correlation_id,
            )
        }
    }

    fn with_correlation(
        status: StatusCode,
        kind: &'static str,
        error: &str,
        message: &str,
        internal: &str,
        expose: bool,
        correlation_id: String,
    ) -> Self {
        Self {
            status,
            kind,
            error: error.to_string(),
            message: message.to_string(),
            details: Some(if expose {
                internal.to_string()
            } else {
                message.to_string()
            }),
            correlation_id: Some(correlation_id),
            fatal: false,
        }
    }

    pub fn internal(internal: &str, expose: bool) -> Self {
        Self::server(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal error",
            "Something went wrong on our side. Please try again.",
            internal,
            expose,
        )
    }

    /// Map an orchestration outcome to its response. Transform errors are
    /// already classified; this only picks the response shape.
    pub fn from_orchestration(err: OrchestrationError, expose: bool) -> Self {
        match err {
            OrchestrationError::LimitReached { limit, .. } => Self::limit_reached(limit),
            OrchestrationError::Transform(transform) => Self::from_transform(transform, expose),
            OrchestrationError::Quota(e) => Self::internal(&format!("quota store: {}", e), expose),
        }
    }

    fn from_transform(err: TransformError, expose: bool) -> Self {
        if err.is_fatal() {
            return Self::fatal(
                err.kind(),
                "Upscaling failed",
                "Server missing image provider credentials",
                &err.to_string(),
                expose,
            );
        }

        match err {
            TransformError::TooLarge { limit, .. } => Self::too_large(limit),
            TransformError::UnsupportedFormat => Self::unsupported_format(),
            TransformError::ProviderThrottled => Self::server(
                StatusCode::SERVICE_UNAVAILABLE,
                err.kind(),
                "Upscaling temporarily unavailable",
                "The enhancement service is busy. Please try again later.",
                &err.to_string(),
                expose,
            ),
            TransformError::Unknown(ref internal) => Self::server(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.kind(),
                "Upscaling failed",
                "The image could not be enhanced. Please try again.",
                internal,
                expose,
            ),
            // Fatal kinds return above
            TransformError::CredentialsMissing => Self::internal(&err.to_string(), expose),
        }
    }
}

/// Render a byte limit the way people read it
fn human_size(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;

    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{} KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}

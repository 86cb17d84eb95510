use thiserror::Error;

/// Failure codes a provider adapter may report.
///
/// Provider responses are mapped into this closed set exactly once, inside
/// the adapter. Nothing past that point inspects provider error text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    #[error("provider credentials are not configured")]
    CredentialsMissing,

    #[error("provider rejected the configured credentials")]
    CredentialsRejected,

    #[error("image is below the minimum size for restoration")]
    TooSmallForRestoration,

    #[error("image exceeds the provider size limit")]
    TooLarge,

    #[error("image format not accepted by the provider")]
    UnsupportedFormat,

    #[error("provider rate limit or credit exhausted")]
    Throttled,

    #[error("provider request failed: {0}")]
    Other(String),
}

/// Caller-facing outcome of a failed transformation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Server misconfiguration; never retried
    #[error("image provider credentials missing or invalid")]
    CredentialsMissing,

    #[error("image too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported image format")]
    UnsupportedFormat,

    /// Provider-side rate or credit exhaustion, distinct from our own quota
    #[error("image provider is throttling requests")]
    ProviderThrottled,

    #[error("transformation failed: {0}")]
    Unknown(String),
}

impl TransformError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            TransformError::CredentialsMissing => "credentials_missing",
            TransformError::TooLarge { .. } => "too_large",
            TransformError::UnsupportedFormat => "unsupported_format",
            TransformError::ProviderThrottled => "provider_throttled",
            TransformError::Unknown(_) => "unknown",
        }
    }

    /// Whether this is a configuration problem operators must fix
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransformError::CredentialsMissing)
    }

    pub(crate) fn from_provider(failure: ProviderFailure, size: usize, limit: usize) -> Self {
        match failure {
            ProviderFailure::CredentialsMissing | ProviderFailure::CredentialsRejected => {
                TransformError::CredentialsMissing
            }
            ProviderFailure::TooLarge => TransformError::TooLarge { size, limit },
            ProviderFailure::UnsupportedFormat => TransformError::UnsupportedFormat,
            ProviderFailure::Throttled => TransformError::ProviderThrottled,
            ProviderFailure::TooSmallForRestoration => {
                TransformError::Unknown("image too small to enhance".to_string())
            }
            ProviderFailure::Other(message) => TransformError::Unknown(message),
        }
    }
}

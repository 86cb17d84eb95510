use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid scale factor: {0} (expected 2, 3 or 4)")]
    InvalidScale(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

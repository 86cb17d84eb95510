//! Seam between the transformation client and a concrete provider

use async_trait::async_trait;
use std::fmt;
use upscale_common::{ImageFormat, ScaleFactor};

use crate::error::ProviderFailure;

/// First step applied before the dimension scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// AI restoration at source resolution
    Restore,
    /// Best-effort quality normalization
    Normalize,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Restore => write!(f, "restore"),
            Pipeline::Normalize => write!(f, "normalize"),
        }
    }
}

/// One submission to the provider
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub image: &'a [u8],
    pub format: ImageFormat,
    pub scale: ScaleFactor,
    pub pipeline: Pipeline,
}

/// What the provider returns for a transformed image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub original_filename: String,
}

/// A remote service that applies a pipeline and a scale to an image
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn upload(&self, request: UploadRequest<'_>) -> Result<ProviderImage, ProviderFailure>;
}

//! Transformation Client
//!
//! Adapts an (image, format, scale) triple into a call against the remote
//! enhancement provider and normalizes the outcome into
//! [`EnhancementResult`](upscale_common::EnhancementResult) or a
//! [`TransformError`].
//!
//! The primary pipeline runs AI restoration at source resolution and then
//! scales. If the provider reports that the image is too small for
//! restoration, the request is retried once with quality normalization in
//! place of restoration. No other failure is retried.

pub mod client;
pub mod cloudinary;
pub mod error;
pub mod provider;

pub use client::{TransformClient, Transformer, DEFAULT_MAX_IMAGE_BYTES};
pub use cloudinary::{CloudinaryConfig, CloudinaryProvider};
pub use error::{ProviderFailure, TransformError};
pub use provider::{ImageProvider, Pipeline, ProviderImage, UploadRequest};

//! Transformation client with the too-small fallback

use async_trait::async_trait;
use tracing::{debug, info, warn};
use upscale_common::{EnhancementRequest, EnhancementResult};

use crate::error::{ProviderFailure, TransformError};
use crate::provider::{ImageProvider, Pipeline, ProviderImage, UploadRequest};

/// Size limit at the transformation boundary (10 MiB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Anything that can turn an enhancement request into a result
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        request: &EnhancementRequest,
    ) -> Result<EnhancementResult, TransformError>;
}

/// Drives an [`ImageProvider`]: primary restore pipeline, one normalize
/// retry when the source is too small for restoration.
pub struct TransformClient<P> {
    provider: P,
    max_image_bytes: usize,
}

impl<P: ImageProvider> TransformClient<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn submit(
        &self,
        request: &EnhancementRequest,
    ) -> Result<ProviderImage, ProviderFailure> {
        let primary = UploadRequest {
            image: &request.image,
            format: request.format,
            scale: request.scale,
            pipeline: Pipeline::Restore,
        };

        match self.provider.upload(primary).await {
            Err(ProviderFailure::TooSmallForRestoration) => {
                info!("Image too small for restoration, retrying with quality normalization");
                let fallback = UploadRequest {
                    pipeline: Pipeline::Normalize,
                    ..primary
                };
                self.provider.upload(fallback).await.inspect_err(|e| {
                    warn!("Fallback pipeline failed: {}", e);
                })
            }
            other => other,
        }
    }
}

#[async_trait]
impl<P: ImageProvider> Transformer for TransformClient<P> {
    async fn transform(
        &self,
        request: &EnhancementRequest,
    ) -> Result<EnhancementResult, TransformError> {
        let size = request.size();
        if size > self.max_image_bytes {
            return Err(TransformError::TooLarge {
                size,
                limit: self.max_image_bytes,
            });
        }

        debug!(
            "Submitting {} bytes of {} at {}",
            size, request.format, request.scale
        );

        let image = self.submit(request).await.map_err(|failure| {
            warn!("Provider failure: {}", failure);
            TransformError::from_provider(failure, size, self.max_image_bytes)
        })?;

        let source_file_name = request
            .file_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or(image.original_filename);

        Ok(EnhancementResult {
            result_url: image.url,
            result_width: image.width,
            result_height: image.height,
            source_file_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use upscale_common::{ImageFormat, ScaleFactor};

    /// Replays scripted responses and records the pipelines it was asked for
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<ProviderImage, ProviderFailure>>>,
        calls: Mutex<Vec<Pipeline>>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<Result<ProviderImage, ProviderFailure>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Pipeline> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageProvider for ScriptedProvider {
        async fn upload(
            &self,
            request: UploadRequest<'_>,
        ) -> Result<ProviderImage, ProviderFailure> {
            self.calls.lock().unwrap().push(request.pipeline);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .expect("provider called more times than scripted")
        }
    }

    fn image(width: u32, height: u32) -> ProviderImage {
        ProviderImage {
            url: "https://res.cloudinary.com/demo/image/upload/v1/abc.png".to_string(),
            width,
            height,
            original_filename: "file".to_string(),
        }
    }

    fn request(bytes: usize) -> EnhancementRequest {
        EnhancementRequest {
            image: vec![0u8; bytes],
            format: ImageFormat::Png,
            scale: ScaleFactor::X2,
            file_name: Some("cat.png".to_string()),
        }
    }

    #[tokio::test]
    async fn test_primary_success_makes_one_call() {
        let client = TransformClient::new(ScriptedProvider::new(vec![Ok(image(800, 600))]));

        let result = client.transform(&request(1024)).await.unwrap();

        assert_eq!(result.result_width, 800);
        assert_eq!(result.result_height, 600);
        assert_eq!(result.source_file_name, "cat.png");
        assert_eq!(client.provider().calls(), vec![Pipeline::Restore]);
    }

    #[tokio::test]
    async fn test_too_small_triggers_single_fallback() {
        let client = TransformClient::new(ScriptedProvider::new(vec![
            Err(ProviderFailure::TooSmallForRestoration),
            Ok(image(96, 96)),
        ]));

        let result = client.transform(&request(512)).await.unwrap();

        assert_eq!(result.result_width, 96);
        assert_eq!(
            client.provider().calls(),
            vec![Pipeline::Restore, Pipeline::Normalize]
        );
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates() {
        let client = TransformClient::new(ScriptedProvider::new(vec![
            Err(ProviderFailure::TooSmallForRestoration),
            Err(ProviderFailure::Throttled),
        ]));

        let err = client.transform(&request(512)).await.unwrap_err();

        assert_eq!(err, TransformError::ProviderThrottled);
        assert_eq!(client.provider().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let cases = vec![
            (ProviderFailure::CredentialsMissing, TransformError::CredentialsMissing),
            (ProviderFailure::CredentialsRejected, TransformError::CredentialsMissing),
            (ProviderFailure::Throttled, TransformError::ProviderThrottled),
            (ProviderFailure::UnsupportedFormat, TransformError::UnsupportedFormat),
            (
                ProviderFailure::Other("boom".to_string()),
                TransformError::Unknown("boom".to_string()),
            ),
        ];

        for (failure, expected) in cases {
            let client = TransformClient::new(ScriptedProvider::new(vec![Err(failure)]));
            let err = client.transform(&request(512)).await.unwrap_err();
            assert_eq!(err, expected);
            assert_eq!(client.provider().calls(), vec![Pipeline::Restore]);
        }
    }

    #[tokio::test]
    async fn test_oversize_rejected_before_provider_call() {
        let client =
            TransformClient::new(ScriptedProvider::new(vec![])).with_max_image_bytes(1000);

        let err = client.transform(&request(1001)).await.unwrap_err();

        assert_eq!(err, TransformError::TooLarge { size: 1001, limit: 1000 });
        assert!(client.provider().calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_file_name_used_when_request_has_none() {
        let client = TransformClient::new(ScriptedProvider::new(vec![Ok(image(10, 10))]));
        let mut req = request(16);
        req.file_name = None;

        let result = client.transform(&req).await.unwrap();
        assert_eq!(result.source_file_name, "file");
    }
}

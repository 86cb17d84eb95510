//! Cloudinary adapter against a local stand-in for the upload API

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use transform_client::{
    CloudinaryConfig, CloudinaryProvider, TransformClient, TransformError, Transformer,
};
use upscale_common::{EnhancementRequest, ImageFormat, ScaleFactor};

/// How the stand-in behaves, plus the transformations it received
#[derive(Clone)]
struct MockCloud {
    mode: &'static str,
    seen: Arc<Mutex<Vec<String>>>,
}

async fn upload_handler(State(cloud): State<MockCloud>, mut multipart: Multipart) -> impl IntoResponse {
    let mut transformation = String::new();
    let mut has_signature = false;
    let mut file = String::new();

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await.unwrap();
        match name.as_str() {
            "transformation" => transformation = value,
            "signature" => has_signature = !value.is_empty(),
            "file" => file = value,
            _ => {}
        }
    }

    cloud.seen.lock().unwrap().push(transformation.clone());

    if !has_signature || !file.starts_with("data:image/png;base64,") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "Invalid request" } })),
        );
    }

    match cloud.mode {
        "throttled" => (
            StatusCode::from_u16(420).unwrap(),
            Json(json!({ "error": { "message": "Rate Limit Exceeded" } })),
        ),
        "tiny" if transformation.starts_with("e_gen_restore") => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "Image is too small for gen_restore" } })),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({
                "secure_url": "https://res.cloudinary.com/demo/image/upload/v1/out.png",
                "width": 128,
                "height": 96,
                "original_filename": "file"
            })),
        ),
    }
}

async fn start_mock(mode: &'static str) -> (String, MockCloud) {
    let cloud = MockCloud {
        mode,
        seen: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/demo/image/upload", post(upload_handler))
        .with_state(cloud.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), cloud)
}

fn client_for(api_base: String) -> TransformClient<CloudinaryProvider> {
    let mut config = CloudinaryConfig::new("demo", "key", "secret");
    config.api_base = api_base;
    TransformClient::new(CloudinaryProvider::new(config, Duration::from_secs(5)).unwrap())
}

fn png_request() -> EnhancementRequest {
    EnhancementRequest {
        image: b"\x89PNG\r\n\x1a\nfake".to_vec(),
        format: ImageFormat::Png,
        scale: ScaleFactor::X2,
        file_name: None,
    }
}

#[tokio::test]
async fn test_restore_pipeline_success() {
    let (base, cloud) = start_mock("ok").await;
    let client = client_for(base);

    let result = client.transform(&png_request()).await.unwrap();

    assert_eq!(result.result_width, 128);
    assert_eq!(result.result_height, 96);
    assert_eq!(
        cloud.seen.lock().unwrap().clone(),
        vec!["e_gen_restore/c_scale,h_ih_mul_2,w_iw_mul_2".to_string()]
    );
}

#[tokio::test]
async fn test_too_small_falls_back_to_normalize() {
    let (base, cloud) = start_mock("tiny").await;
    let client = client_for(base);

    let result = client.transform(&png_request()).await.unwrap();

    assert_eq!(result.result_url, "https://res.cloudinary.com/demo/image/upload/v1/out.png");
    assert_eq!(
        cloud.seen.lock().unwrap().clone(),
        vec![
            "e_gen_restore/c_scale,h_ih_mul_2,w_iw_mul_2".to_string(),
            "q_auto:best/c_scale,h_ih_mul_2,w_iw_mul_2".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_throttling_is_classified_and_not_retried() {
    let (base, cloud) = start_mock("throttled").await;
    let client = client_for(base);

    let err = client.transform(&png_request()).await.unwrap_err();

    assert_eq!(err, TransformError::ProviderThrottled);
    assert_eq!(cloud.seen.lock().unwrap().len(), 1);
}

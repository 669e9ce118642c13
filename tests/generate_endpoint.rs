use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use tower::ServiceExt;

use prompt_art_backend::config::{CorsConfig, ImageRenderConfig};
use prompt_art_backend::features::diagnostics::DatabaseHandle;
use prompt_art_backend::features::image::{FontResolver, ImageRenderer, ImageService, RenderError};
use prompt_art_backend::{AppState, build_router};

fn render_config() -> ImageRenderConfig {
    ImageRenderConfig {
        max_parallel: 2,
        optimize_speed: true,
        ..ImageRenderConfig::default()
    }
}

fn app_with(image: ImageService) -> Router {
    let state = AppState {
        image: Arc::new(image),
        database: DatabaseHandle::Missing,
    };
    build_router(state, &CorsConfig::default())
}

fn build_app() -> Router {
    app_with(ImageService::new(
        Arc::new(FontResolver::builtin_only()),
        &render_config(),
    ))
}

/// PNG 编码阶段总是失败的渲染器
struct FailingEncoder;

impl ImageRenderer for FailingEncoder {
    fn render_png(
        &self,
        _prompt: &str,
        _width: u32,
        _height: u32,
        _seed: u64,
        _fonts: &FontResolver,
    ) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Encode("output buffer rejected".to_string()))
    }
}

async fn post_generate(app: Router, body: Value) -> (StatusCode, Option<String>, Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    let resp = app.oneshot(req).await.expect("call /api/generate");
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json: Value = serde_json::from_slice(&bytes).expect("parse json");
    (status, content_type, json)
}

#[tokio::test]
async fn generate_returns_png_of_requested_size() {
    let (status, _, json) = post_generate(
        build_app(),
        json!({"prompt": "A cat", "width": 320, "height": 256, "seed": 42}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mime_type"], "image/png");
    assert_eq!(json["width"], 320);
    assert_eq!(json["height"], 256);
    assert_eq!(json["prompt"], "A cat");
    assert_eq!(json["seed"], 42);
    assert!(json["generated_at"].as_str().unwrap().ends_with('Z'));

    let png = STANDARD
        .decode(json["image_base64"].as_str().unwrap())
        .expect("valid base64");
    let img = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
        .expect("valid png");
    assert_eq!((img.width(), img.height()), (320, 256));
}

#[tokio::test]
async fn same_seed_is_byte_identical() {
    let body = json!({"prompt": "Sunset over mountains", "width": 256, "height": 256, "seed": 1234});
    let (_, _, first) = post_generate(build_app(), body.clone()).await;
    let (_, _, second) = post_generate(build_app(), body).await;
    assert_eq!(first["image_base64"], second["image_base64"]);
}

#[tokio::test]
async fn missing_seed_is_assigned_and_reported() {
    let (status, _, json) = post_generate(
        build_app(),
        json!({"prompt": "Hi", "width": 256, "height": 256, "seed": null}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let seed = json["seed"].as_i64().expect("seed present");
    assert!((0..=u32::MAX as i64).contains(&seed));
}

#[tokio::test]
async fn width_and_height_default_to_768() {
    let (status, _, json) = post_generate(build_app(), json!({"prompt": "Defaults", "seed": 3})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["width"], 768);
    assert_eq!(json["height"], 768);
}

#[tokio::test]
async fn short_prompt_is_rejected_with_field_errors() {
    let (status, content_type, json) =
        post_generate(build_app(), json!({"prompt": "A", "width": 512})).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(content_type.as_deref(), Some("application/problem+json"));
    assert_eq!(json["code"], "VALIDATION_FAILED");
    let fields: Vec<&str> = json["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["prompt"]);
}

#[tokio::test]
async fn out_of_range_sizes_are_rejected() {
    let (status, _, json) = post_generate(
        build_app(),
        json!({"prompt": "Valid prompt", "width": 255, "height": 1025}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = json["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["width", "height"]);
}

#[tokio::test]
async fn missing_prompt_and_malformed_json_are_problems() {
    let (status, _, json) = post_generate(build_app(), json!({"width": 300})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "VALIDATION_FAILED");

    let req = Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("build request");
    let resp = build_app().oneshot(req).await.expect("call /api/generate");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsigned_seed_beyond_i64_is_echoed() {
    let (status, _, json) = post_generate(
        build_app(),
        json!({"prompt": "Big seed", "width": 256, "height": 256, "seed": u64::MAX}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["seed"].as_u64(), Some(u64::MAX));

    let (status, _, json) = post_generate(
        build_app(),
        json!({"prompt": "Negative seed", "width": 256, "height": 256, "seed": -7}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["seed"].as_i64(), Some(-7));
}

#[tokio::test]
async fn non_integer_seed_is_a_validation_problem() {
    let (status, content_type, json) = post_generate(
        build_app(),
        json!({"prompt": "Float seed", "width": 256, "height": 256, "seed": 1.5}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(content_type.as_deref(), Some("application/problem+json"));
    assert_eq!(json["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn encode_failure_is_a_generation_problem() {
    let app = app_with(ImageService::with_renderer(
        Arc::new(FontResolver::builtin_only()),
        &render_config(),
        Arc::new(FailingEncoder),
    ));
    let (status, content_type, json) = post_generate(
        app,
        json!({"prompt": "A cat", "width": 256, "height": 256, "seed": 1}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(content_type.as_deref(), Some("application/problem+json"));
    assert_eq!(json["status"], 500);
    assert_eq!(json["code"], "GENERATION_FAILED");
    assert_eq!(
        json["detail"],
        "Generation failed: png encode error: output buffer rejected"
    );
    assert!(json["requestId"].as_str().is_some_and(|id| id.starts_with("req_")));
}

use axum::{
    Router,
    body::Body,
    http::{Request, header},
    routing::get,
};
use tower::ServiceExt;

use prompt_art_backend::config::CorsConfig;
use prompt_art_backend::cors::build_cors_layer;

fn app_with(cors: &CorsConfig) -> Router {
    let layer = build_cors_layer(cors).expect("cors layer");
    Router::new()
        .route("/", get(|| async { "ok" }).post(|| async { "ok" }))
        .layer(layer)
}

#[tokio::test]
async fn default_layer_mirrors_origin_with_credentials() {
    let app = app_with(&CorsConfig::default());

    let req = Request::builder()
        .method("GET")
        .uri("/")
        .header(header::ORIGIN, "https://any.example")
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("call app");

    let headers = resp.headers();
    assert_eq!(
        headers
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("https://any.example")
    );
    assert_eq!(
        headers
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .and_then(|v| v.to_str().ok()),
        Some("true")
    );
}

#[tokio::test]
async fn default_preflight_echoes_method_and_headers() {
    let app = app_with(&CorsConfig::default());

    let req = Request::builder()
        .method("OPTIONS")
        .uri("/")
        .header(header::ORIGIN, "https://any.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,x-request-id")
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("call app");

    let allow_methods = resp
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .and_then(|v| v.to_str().ok())
        .expect("missing allow methods");
    assert!(allow_methods.contains("POST"));

    let allow_headers = resp
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .and_then(|v| v.to_str().ok())
        .expect("missing allow headers");
    assert!(allow_headers.contains("x-request-id"));
}

#[tokio::test]
async fn explicit_origin_list_is_respected() {
    let cors = CorsConfig {
        allowed_origins: vec!["https://example.com".to_string()],
        allowed_methods: vec!["GET".to_string()],
        allowed_headers: vec!["Content-Type".to_string()],
        allow_credentials: false,
        ..CorsConfig::default()
    };
    let app = app_with(&cors);

    let req = Request::builder()
        .method("GET")
        .uri("/")
        .header(header::ORIGIN, "https://example.com")
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("call app");

    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("https://example.com")
    );
}

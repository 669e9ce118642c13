use axum::Router;
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::CorsConfig;
use crate::cors::build_cors_layer;
use crate::features::{diagnostics, health, image};
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

pub fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // 明确排除不该压缩的响应：流式响应会被缓冲，图片与二进制下载压缩收益极低。
    // JSON 中的 base64 图片仍可获得可观的压缩率。
    SizeAbove::default()
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(NotForContentType::const_new("application/octet-stream"))
        .and(NotForContentType::const_new("application/zip"))
        .and(NotForContentType::const_new("application/gzip"))
}

/// 组装完整的 HTTP 应用：业务路由、文档、request_id、CORS 与压缩
pub fn build_router(state: AppState, cors: &CorsConfig) -> Router {
    let mut app = Router::<AppState>::new()
        .merge(health::create_health_router())
        .merge(diagnostics::create_diagnostics_router())
        .merge(image::create_image_router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state);

    app = app.layer(CompressionLayer::new().compress_when(compression_predicate()));

    if let Some(layer) = build_cors_layer(cors) {
        app = app.layer(layer);
    }

    // 最外层：保证 CORS 预检与错误响应同样带上 request_id
    app.layer(axum::middleware::from_fn(request_id_middleware))
}

#[cfg(test)]
mod tests {
    use super::compression_predicate;
    use axum::body::Body;
    use axum::http::{Response as HttpResponse, header};
    use tower_http::compression::predicate::Predicate;

    fn should_compress_for(ct: &str) -> bool {
        // 超过 SizeAbove 默认阈值（32B）
        let body_bytes = vec![b'x'; 2048];
        let resp = HttpResponse::builder()
            .header(header::CONTENT_TYPE, ct)
            .body(Body::from(body_bytes))
            .unwrap();
        compression_predicate().should_compress(&resp)
    }

    #[test]
    fn compression_predicate_allows_json() {
        assert!(should_compress_for("application/json"));
        assert!(should_compress_for("application/problem+json"));
    }

    #[test]
    fn compression_predicate_disables_images_and_streams() {
        assert!(!should_compress_for("image/png"));
        assert!(!should_compress_for("text/event-stream"));
        assert!(!should_compress_for("application/octet-stream"));
    }
}

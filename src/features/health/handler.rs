use axum::{Json, Router, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    #[schema(example = "healthy")]
    pub status: String,
    /// 服务名称
    #[schema(example = "prompt-art-backend")]
    pub service: String,
    /// 当前版本（Cargo package version）
    #[schema(example = "0.1.0")]
    pub version: String,
}

/// 问候消息
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/health",
    summary = "健康检查",
    description = "用于探活的健康检查端点，返回服务状态与版本信息。",
    responses((status = 200, description = "服务健康", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[utoipa::path(
    get,
    path = "/",
    summary = "根路径问候",
    responses((status = 200, description = "问候消息", body = MessageResponse)),
    tag = "Health"
)]
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Hello from FastAPI Backend!".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/hello",
    summary = "API 问候",
    responses((status = 200, description = "问候消息", body = MessageResponse)),
    tag = "Health"
)]
pub async fn hello() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Hello from the backend API!".to_string(),
    })
}

pub fn create_health_router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/hello", get(hello))
}

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};

use crate::{error::AppError, state::AppState};

use super::types::{GenerateRequest, GenerateResponse};

#[utoipa::path(
    post,
    path = "/api/generate",
    summary = "根据提示词生成占位图",
    description = "按提示词、尺寸与种子程序化合成一张 PNG 占位图（背景渐变光斑 + 半透明卡片 + 居中文字），以 base64 返回。相同参数与种子的结果逐字节一致；未提供 seed 时服务端随机分配并在响应中返回。",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "生成成功", body = GenerateResponse),
        (
            status = 400,
            description = "请求体不是合法 JSON",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 422,
            description = "参数校验失败（prompt 长度、width/height 范围等）",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 500,
            description = "合成或编码失败，detail 以 \"Generation failed: \" 开头",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Image"
)]
pub async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let Json(req) = payload?;
    let params = req.validate()?;
    let res = state.image.generate(params).await?;
    Ok(Json(res))
}

pub fn create_image_router() -> Router<AppState> {
    Router::<AppState>::new().route("/api/generate", post(generate_image))
}

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 请求体不是合法 JSON
    #[error("JSON 解析错误: {0}")]
    Json(String),

    /// 参数校验错误
    #[error("参数校验错误: {0}")]
    Validation(String),

    /// 字段级参数校验错误
    #[error("参数校验错误: {}", summarize_fields(.0))]
    InvalidFields(Vec<ProblemFieldError>),

    /// 图片合成或编码失败
    #[error("Generation failed: {0}")]
    Generation(String),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

fn summarize_fields(errors: &[ProblemFieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// RFC7807 风格的错误响应（Problem Details）。
///
/// 设计目标：
/// - 让所有 API 错误返回结构化 JSON，便于调用方稳定处理
/// - 与 OpenAPI 一致（content-type = application/problem+json）
/// - 允许在不破坏主结构的前提下扩展字段（如 requestId、字段级校验错误）
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Validation Failed")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 422)]
    pub status: u16,

    /// 人类可读的详细信息（尽量稳定，不建议依赖解析）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "VALIDATION_FAILED")]
    pub code: String,

    /// 可选：请求追踪 ID（由 request-id middleware 回填）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// 可选：字段级校验错误。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ProblemFieldError>>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemFieldError {
    /// 字段名
    pub field: String,
    /// 字段错误信息。
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) | AppError::InvalidFields(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Generation(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::Json(_) => "BAD_REQUEST",
            AppError::Validation(_) | AppError::InvalidFields(_) => "VALIDATION_FAILED",
            AppError::Generation(_) => "GENERATION_FAILED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNPROCESSABLE_ENTITY => "Validation Failed",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let title = self.title().to_string();
        let code = self.stable_code().to_string();
        let detail = Some(self.to_string());

        let errors = match self {
            AppError::InvalidFields(errors) => Some(errors),
            _ => None,
        };

        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title,
            status: status.as_u16(),
            detail,
            code,
            request_id: crate::request_id::current_request_id(),
            errors,
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // 结构合法但字段缺失/类型不符：与字段越界一样按校验失败处理
            JsonRejection::JsonDataError(e) => AppError::Validation(e.body_text()),
            other => AppError::Json(other.body_text()),
        }
    }
}

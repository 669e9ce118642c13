use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

use super::database::DatabaseHandle;

const MAX_LISTED_COLLECTIONS: usize = 10;
const MAX_ERROR_CHARS: usize = 50;

/// 诊断接口响应
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DiagnosticsResponse {
    /// 后端自身状态
    #[schema(example = "✅ Running")]
    pub backend: String,
    /// 数据库探测结果
    #[schema(example = "❌ Database module not found (run enable-database first)")]
    pub database: String,
    /// `DATABASE_URL` 是否设置
    #[schema(example = "❌ Not Set")]
    pub database_url: String,
    /// `DATABASE_NAME` 是否设置
    #[schema(example = "❌ Not Set")]
    pub database_name: String,
    /// 连接状态：Connected / Not Connected
    #[schema(example = "Not Connected")]
    pub connection_status: String,
    /// 前 10 个集合名
    pub collections: Vec<String>,
}

fn env_flag(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => "✅ Set".to_string(),
        _ => "❌ Not Set".to_string(),
    }
}

/// 生成诊断报告，任何数据库错误都折叠为状态文本
pub async fn check_database(
    database: &DatabaseHandle,
    database_url: Option<&str>,
    database_name: Option<&str>,
) -> DiagnosticsResponse {
    let mut res = DiagnosticsResponse {
        backend: "✅ Running".to_string(),
        database: String::new(),
        database_url: env_flag(database_url),
        database_name: env_flag(database_name),
        connection_status: "Not Connected".to_string(),
        collections: Vec::new(),
    };

    match database {
        DatabaseHandle::Missing => {
            res.database = "❌ Database module not found (run enable-database first)".to_string();
        }
        DatabaseHandle::Uninitialized => {
            res.database = "⚠️  Available but not initialized".to_string();
        }
        DatabaseHandle::Ready(catalog) => {
            res.connection_status = "Connected".to_string();
            match catalog.list_collection_names().await {
                Ok(mut names) => {
                    names.truncate(MAX_LISTED_COLLECTIONS);
                    res.collections = names;
                    res.database = "✅ Connected & Working".to_string();
                }
                Err(e) => {
                    let msg: String = e.to_string().chars().take(MAX_ERROR_CHARS).collect();
                    tracing::warn!("数据库集合列举失败: {}", e);
                    res.database = format!("⚠️  Connected but Error: {msg}");
                }
            }
        }
    }

    res
}

#[utoipa::path(
    get,
    path = "/test",
    summary = "数据库诊断",
    description = "探测可选的数据库协作方与 DATABASE_URL / DATABASE_NAME 环境变量，总是返回 200。",
    responses((status = 200, description = "诊断结果", body = DiagnosticsResponse)),
    tag = "Diagnostics"
)]
pub async fn test_database(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let url = std::env::var("DATABASE_URL").ok();
    let name = std::env::var("DATABASE_NAME").ok();
    Json(check_database(&state.database, url.as_deref(), name.as_deref()).await)
}

pub fn create_diagnostics_router() -> Router<AppState> {
    Router::<AppState>::new().route("/test", get(test_database))
}

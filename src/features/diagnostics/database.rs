use futures_util::future::BoxFuture;
use sqlx::{
    ConnectOptions, Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// 数据库协作方错误
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("不支持的数据库地址: {0}")]
    UnsupportedUrl(String),

    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
}

/// 可列出集合（表）名的数据库句柄
pub trait CollectionCatalog: Send + Sync {
    /// 数据库名称
    fn name(&self) -> Option<&str>;

    /// 列出全部集合名
    fn list_collection_names(&self) -> BoxFuture<'_, Result<Vec<String>, DatabaseError>>;
}

/// 可选的数据库能力。
///
/// 图片生成不依赖它，只有诊断接口会读取。
#[derive(Clone, Default)]
pub enum DatabaseHandle {
    /// 未配置任何数据库
    #[default]
    Missing,
    /// 已配置但初始化失败或地址不受支持
    Uninitialized,
    /// 可用的数据库句柄
    Ready(Arc<dyn CollectionCatalog>),
}

impl DatabaseHandle {
    pub fn ready(catalog: impl CollectionCatalog + 'static) -> Self {
        Self::Ready(Arc::new(catalog))
    }

    /// 根据 `DATABASE_URL` / `DATABASE_NAME` 初始化数据库句柄，失败时降级而不是报错
    pub async fn connect_from_env() -> Self {
        let url = std::env::var("DATABASE_URL").ok();
        let name = std::env::var("DATABASE_NAME").ok();
        Self::connect(url.as_deref(), name.as_deref()).await
    }

    pub async fn connect(url: Option<&str>, name: Option<&str>) -> Self {
        let Some(url) = url.map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::info!("未设置 DATABASE_URL，诊断接口将报告数据库不可用");
            return Self::Missing;
        };

        match SqliteCatalog::connect(url, name).await {
            Ok(catalog) => {
                tracing::info!(
                    "数据库已连接: {}",
                    catalog.name().unwrap_or("<unnamed>")
                );
                Self::ready(catalog)
            }
            Err(e) => {
                tracing::warn!("数据库初始化失败：{}（将继续运行）", e);
                Self::Uninitialized
            }
        }
    }
}

/// 基于 SQLite 的集合目录：表即集合
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
    name: Option<String>,
}

impl SqliteCatalog {
    pub async fn connect(url: &str, name: Option<&str>) -> Result<Self, DatabaseError> {
        if !url.starts_with("sqlite:") {
            return Err(DatabaseError::UnsupportedUrl(url.to_string()));
        }

        let opt = SqliteConnectOptions::from_str(url)?.disable_statement_logging();
        // 单连接：`sqlite::memory:` 的数据只存在于该连接中
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opt)
            .await?;

        let name = name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| name_from_url(url));

        Ok(Self { pool, name })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl CollectionCatalog for SqliteCatalog {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn list_collection_names(&self) -> BoxFuture<'_, Result<Vec<String>, DatabaseError>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .iter()
                .map(|r| r.get::<String, _>("name"))
                .collect())
        })
    }
}

/// `sqlite://data/app.db?mode=rwc` → `app`
fn name_from_url(url: &str) -> Option<String> {
    let rest = url.strip_prefix("sqlite:")?;
    let rest = rest.trim_start_matches("//");
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return Some("memory".to_string());
    }
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
}

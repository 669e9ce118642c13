use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::diagnostics::DatabaseHandle;
use crate::features::image::{FontCandidate, FontResolver};

/// 启动阶段准备好的共享资源
pub struct StartupResources {
    pub fonts: Arc<FontResolver>,
    pub database: DatabaseHandle,
}

/// 执行启动检查
///
/// 1. 检查字体目录（仅告警，不阻断启动）
/// 2. 在阻塞线程池中构建字体库并完成候选字体解析
/// 3. 初始化可选的数据库协作方
pub async fn run_startup_checks(config: &AppConfig) -> Result<StartupResources, AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    let fonts_dir = config.fonts_path();
    ensure_font_resources(&fonts_dir);

    let candidates: Vec<FontCandidate> = config
        .fonts
        .candidates
        .iter()
        .map(FontCandidate::new)
        .collect();

    let t_prewarm = std::time::Instant::now();
    let fonts = tokio::task::spawn_blocking(move || {
        let resolver = FontResolver::with_system_fonts(fonts_dir, candidates);
        // 首次解析会读取字体文件，放在启动阶段完成
        let _ = resolver.resolve(18.0);
        resolver
    })
    .await
    .map_err(|e| AppError::Internal(format!("字体预热任务失败: {e}")))?;

    match fonts.resolved_name() {
        Some(name) => tracing::info!(
            "字体预热完成: {} ({}ms)",
            name,
            t_prewarm.elapsed().as_millis()
        ),
        None => tracing::info!(
            "字体预热完成: 内置点阵字体 ({}ms)",
            t_prewarm.elapsed().as_millis()
        ),
    }

    let database = DatabaseHandle::connect_from_env().await;

    tracing::info!("✅ 启动检查完成");
    Ok(StartupResources {
        fonts: Arc::new(fonts),
        database,
    })
}

/// 字体目录缺失时只告警：系统字体与内置点阵字体仍可用
fn ensure_font_resources(fonts_dir: &Path) {
    if !fonts_dir.exists() {
        tracing::warn!(
            "⚠️ 未找到字体目录: {:?}，将使用系统字体或内置点阵字体",
            fonts_dir
        );
        return;
    }

    let has_font = std::fs::read_dir(fonts_dir)
        .map(|entries| {
            entries.flatten().any(|e| {
                let path = e.path();
                path.extension() == Some("ttf".as_ref()) || path.extension() == Some("otf".as_ref())
            })
        })
        .unwrap_or(false);

    if has_font {
        tracing::info!("✅ 字体目录已就绪: {:?}", fonts_dir);
    } else {
        tracing::warn!("⚠️ 字体目录 {:?} 中没有 .ttf/.otf 文件", fonts_dir);
    }
}

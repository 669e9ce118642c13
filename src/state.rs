use std::sync::Arc;

use crate::features::diagnostics::DatabaseHandle;
use crate::features::image::ImageService;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 图片生成服务（字体、渲染并发许可与结果缓存）
    pub image: Arc<ImageService>,
    /// 可选的数据库句柄，仅诊断接口使用
    pub database: DatabaseHandle,
}

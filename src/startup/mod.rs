/// 启动检查工具模块
pub mod checks;

pub use checks::{StartupResources, run_startup_checks};

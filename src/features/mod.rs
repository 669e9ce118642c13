/// 诊断：可选数据库协作方与环境变量探测
pub mod diagnostics;
/// 健康检查与问候接口
pub mod health;
/// 提示词占位图生成
pub mod image;

use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 默认配置文件名（可选，不存在时使用内置默认值）
const CONFIG_FILE: &str = "config.toml";

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口（可被 `PORT` 环境变量覆盖）
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8000
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default = "CorsConfig::default_enabled")]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::wildcard")]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::wildcard")]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::wildcard")]
    pub allowed_headers: Vec<String>,
    /// 暴露的响应头列表（支持 "*" 表示任意）
    #[serde(default)]
    pub expose_headers: Vec<String>,
    /// 是否允许携带凭证（Cookie/Authorization）
    #[serde(default = "CorsConfig::default_allow_credentials")]
    pub allow_credentials: bool,
    /// 预检缓存时间（秒）
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CorsConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_allow_credentials() -> bool {
        true
    }

    fn wildcard() -> Vec<String> {
        vec!["*".to_string()]
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            allowed_origins: Self::wildcard(),
            allowed_methods: Self::wildcard(),
            allowed_headers: Self::wildcard(),
            expose_headers: Vec::new(),
            allow_credentials: Self::default_allow_credentials(),
            max_age_secs: None,
        }
    }
}

/// 字体配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontConfig {
    /// 自定义字体目录（优先于系统字体）
    #[serde(default = "FontConfig::default_dir")]
    pub dir: String,
    /// 按顺序尝试的字体文件名，全部失败时使用内置点阵字体
    #[serde(default = "FontConfig::default_candidates")]
    pub candidates: Vec<String>,
}

impl FontConfig {
    fn default_dir() -> String {
        "resources/fonts".to_string()
    }

    fn default_candidates() -> Vec<String> {
        vec!["DejaVuSans.ttf".to_string(), "arial.ttf".to_string()]
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            candidates: Self::default_candidates(),
        }
    }
}

/// 图片渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRenderConfig {
    /// 并发渲染许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 是否优先速度编码（PNG 快速压缩、不做行过滤），体积会变大
    #[serde(default)]
    pub optimize_speed: bool,
    /// 是否启用结果缓存
    #[serde(default = "ImageRenderConfig::default_cache_enabled")]
    pub cache_enabled: bool,
    /// 缓存最大容量（字节），按 base64 长度加权
    #[serde(default = "ImageRenderConfig::default_cache_max_bytes")]
    pub cache_max_bytes: u64,
    /// 缓存 TTL（秒）
    #[serde(default = "ImageRenderConfig::default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// 缓存 TTI（秒）
    #[serde(default = "ImageRenderConfig::default_cache_tti")]
    pub cache_tti_secs: u64,
}

impl ImageRenderConfig {
    fn default_cache_enabled() -> bool {
        true
    }
    fn default_cache_max_bytes() -> u64 {
        64 * 1024 * 1024
    }
    fn default_cache_ttl() -> u64 {
        300
    }
    fn default_cache_tti() -> u64 {
        60
    }
}

impl Default for ImageRenderConfig {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            optimize_speed: false,
            cache_enabled: Self::default_cache_enabled(),
            cache_max_bytes: Self::default_cache_max_bytes(),
            cache_ttl_secs: Self::default_cache_ttl(),
            cache_tti_secs: Self::default_cache_tti(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// CORS 配置
    #[serde(default)]
    pub cors: CorsConfig,
    /// 字体配置
    #[serde(default)]
    pub fonts: FontConfig,
    /// 图片渲染配置
    #[serde(default)]
    pub image: ImageRenderConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 加载配置：可选的 config.toml → `APP_*` 环境变量 → `PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件（可选）", config_path);

        let builder = ConfigBuilder::builder()
            // 配置文件不存在时使用内置默认值
            .add_source(File::from(config_path).format(FileFormat::Toml).required(false))
            // 支持环境变量覆盖，例如：APP_SERVER_HOST
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = builder.try_deserialize()?;
        config.apply_port_override(std::env::var("PORT").ok().as_deref())?;

        tracing::debug!("配置加载完成: {:?}", config);

        Ok(config)
    }

    /// 平台约定的 `PORT` 优先级最高
    fn apply_port_override(&mut self, raw: Option<&str>) -> Result<(), ConfigError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        self.server.port = raw
            .parse()
            .map_err(|_| ConfigError::Message(format!("PORT 不是合法端口: {raw}")))?;
        Ok(())
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE)
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 获取自定义字体目录
    pub fn fonts_path(&self) -> PathBuf {
        PathBuf::from(&self.fonts.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    #[test]
    fn defaults_match_service_contract() {
        let config = AppConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8000");
        assert!(config.cors.enabled);
        assert!(config.cors.allow_credentials);
        assert_eq!(config.cors.allowed_origins, vec!["*"]);
        assert_eq!(config.fonts.candidates, vec!["DejaVuSans.ttf", "arial.ttf"]);
        assert_eq!(config.image.max_parallel, 0);
    }

    #[test]
    fn port_override_applies_and_validates() {
        let mut config = AppConfig::default();
        config.apply_port_override(Some(" 9001 ")).unwrap();
        assert_eq!(config.server.port, 9001);

        config.apply_port_override(None).unwrap();
        config.apply_port_override(Some("")).unwrap();
        assert_eq!(config.server.port, 9001);

        assert!(config.apply_port_override(Some("not-a-port")).is_err());
        assert!(config.apply_port_override(Some("70000")).is_err());
    }

    #[test]
    fn partial_toml_keeps_section_defaults() {
        let raw = r#"
            [server]
            port = 3000

            [image]
            max_parallel = 2
        "#;
        let built = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap();
        let config: AppConfig = built.try_deserialize().unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.image.max_parallel, 2);
        assert!(config.image.cache_enabled);
        assert_eq!(config.fonts.dir, "resources/fonts");
    }
}

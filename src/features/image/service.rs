use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::STANDARD as base64_engine};
use moka::future::Cache;
use rand::{RngCore, rngs::OsRng};
use tokio::sync::Semaphore;

use crate::config::ImageRenderConfig;
use crate::error::AppError;

use super::font::FontResolver;
use super::renderer::{ImageRenderer, ProceduralRenderer};
use super::types::{GenerateParams, GenerateResponse, PNG_MIME_TYPE, Seed};

/// 错误信息在响应中的最大字符数
const ERROR_DETAIL_MAX_CHARS: usize = 200;

/// 图片生成服务：限制并发渲染、放入阻塞线程池执行，并按确定性参数缓存结果。
pub struct ImageService {
    fonts: Arc<FontResolver>,
    renderer: Arc<dyn ImageRenderer>,
    /// 控制并发渲染的信号量（限制 CPU 密集型任务数量）
    render_semaphore: Arc<Semaphore>,
    /// base64 结果缓存（按字节大小加权）；None 表示关闭缓存
    cache: Option<Cache<String, Arc<str>>>,
}

impl ImageService {
    pub fn new(fonts: Arc<FontResolver>, config: &ImageRenderConfig) -> Self {
        let renderer = ProceduralRenderer {
            optimize_speed: config.optimize_speed,
        };
        Self::with_renderer(fonts, config, Arc::new(renderer))
    }

    /// 使用自定义渲染器构建服务（仍沿用配置中的并发与缓存设置）。
    pub fn with_renderer(
        fonts: Arc<FontResolver>,
        config: &ImageRenderConfig,
        renderer: Arc<dyn ImageRenderer>,
    ) -> Self {
        let permits = if config.max_parallel == 0 {
            num_cpus::get()
        } else {
            config.max_parallel as usize
        };
        let cache = config.cache_enabled.then(|| {
            Cache::builder()
                .weigher(|_k, v: &Arc<str>| v.len().try_into().unwrap_or(u32::MAX))
                .max_capacity(config.cache_max_bytes)
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .time_to_idle(Duration::from_secs(config.cache_tti_secs))
                .build()
        });

        Self {
            fonts,
            renderer,
            render_semaphore: Arc::new(Semaphore::new(permits.max(1))),
            cache,
        }
    }

    /// 生成一张占位图并组装响应；未提供种子时随机分配。
    pub async fn generate(&self, params: GenerateParams) -> Result<GenerateResponse, AppError> {
        let seed = params.seed.unwrap_or_else(random_seed);
        let key = cache_key(&params.prompt, params.width, params.height, seed);

        let image_base64 = match self.cached(&key).await {
            Some(hit) => {
                tracing::debug!("图片缓存命中: seed={}", seed);
                hit
            }
            None => {
                let encoded = self
                    .render_base64(params.prompt.clone(), params.width, params.height, seed)
                    .await?;
                if let Some(cache) = &self.cache {
                    cache.insert(key, encoded.clone()).await;
                }
                encoded
            }
        };

        Ok(GenerateResponse {
            image_base64: image_base64.to_string(),
            mime_type: PNG_MIME_TYPE.to_string(),
            width: params.width,
            height: params.height,
            prompt: params.prompt,
            seed,
            generated_at: utc_timestamp(),
        })
    }

    async fn cached(&self, key: &str) -> Option<Arc<str>> {
        match &self.cache {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    async fn render_base64(
        &self,
        prompt: String,
        width: u32,
        height: u32,
        seed: Seed,
    ) -> Result<Arc<str>, AppError> {
        let _permit = self
            .render_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("获取渲染信号量失败: {e}")))?;

        // 合成与编码都是 CPU 密集型操作，必须移出 tokio worker。
        let fonts = self.fonts.clone();
        let renderer = self.renderer.clone();
        let t_total = Instant::now();
        let png = tokio::task::spawn_blocking(move || {
            renderer.render_png(&prompt, width, height, seed.as_u64(), &fonts)
        })
        .await
        .map_err(|e| generation_error(&e.to_string()))?
        .map_err(|e| generation_error(&e.to_string()))?;

        tracing::info!(
            "图片生成完成: {}x{}, seed={}, PNG {} 字节, 耗时={}ms",
            width,
            height,
            seed,
            png.len(),
            t_total.elapsed().as_millis()
        );

        Ok(Arc::from(base64_engine.encode(png)))
    }
}

/// 从操作系统 CSPRNG 取 4 字节，按大端解释为 u32。
pub fn random_seed() -> Seed {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    Seed::from(u32::from_be_bytes(bytes))
}

fn cache_key(prompt: &str, width: u32, height: u32, seed: Seed) -> String {
    format!("{width}x{height}:{seed}:{prompt}")
}

fn utc_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

fn generation_error(message: &str) -> AppError {
    tracing::error!("图片生成失败: {}", message);
    AppError::Generation(message.chars().take(ERROR_DETAIL_MAX_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::image::RenderError;

    /// 总是编码失败的渲染器
    struct BrokenEncoder;

    impl ImageRenderer for BrokenEncoder {
        fn render_png(
            &self,
            _prompt: &str,
            _width: u32,
            _height: u32,
            _seed: u64,
            _fonts: &FontResolver,
        ) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Encode("writer closed".to_string()))
        }
    }

    fn service(cache_enabled: bool) -> ImageService {
        let config = ImageRenderConfig {
            cache_enabled,
            max_parallel: 1,
            ..ImageRenderConfig::default()
        };
        ImageService::new(Arc::new(FontResolver::builtin_only()), &config)
    }

    fn params(seed: Option<Seed>) -> GenerateParams {
        GenerateParams {
            prompt: "A cat".to_string(),
            width: 256,
            height: 256,
            seed,
        }
    }

    #[tokio::test]
    async fn fixed_seed_yields_identical_payload() {
        let svc = service(false);
        let a = svc.generate(params(Some(Seed::Signed(42)))).await.unwrap();
        let b = svc.generate(params(Some(Seed::Signed(42)))).await.unwrap();
        assert_eq!(a.seed, Seed::Signed(42));
        assert_eq!(a.image_base64, b.image_base64);
        assert_eq!(a.mime_type, "image/png");
    }

    #[tokio::test]
    async fn cached_payload_matches_fresh_render() {
        let cached = service(true);
        let seed = Some(Seed::Signed(7));
        let first = cached.generate(params(seed)).await.unwrap();
        let second = cached.generate(params(seed)).await.unwrap();
        let fresh = service(false).generate(params(seed)).await.unwrap();
        assert_eq!(first.image_base64, second.image_base64);
        assert_eq!(first.image_base64, fresh.image_base64);
    }

    #[tokio::test]
    async fn missing_seed_is_assigned() {
        let svc = service(false);
        let res = svc.generate(params(None)).await.unwrap();
        assert!(res.seed.as_u64() <= u64::from(u32::MAX));
    }

    #[tokio::test]
    async fn unsigned_seed_is_echoed() {
        let svc = service(false);
        let res = svc.generate(params(Some(Seed::Unsigned(u64::MAX)))).await.unwrap();
        assert_eq!(res.seed, Seed::Unsigned(u64::MAX));
    }

    #[tokio::test]
    async fn renderer_failure_maps_to_generation_error() {
        let config = ImageRenderConfig {
            cache_enabled: true,
            ..ImageRenderConfig::default()
        };
        let svc = ImageService::with_renderer(
            Arc::new(FontResolver::builtin_only()),
            &config,
            Arc::new(BrokenEncoder),
        );
        let err = svc.generate(params(Some(Seed::Signed(1)))).await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
        assert_eq!(err.to_string(), "Generation failed: png encode error: writer closed");

        // 失败结果不进缓存
        assert!(svc.cached(&cache_key("A cat", 256, 256, Seed::Signed(1))).await.is_none());
    }

    #[test]
    fn random_seeds_vary() {
        let seeds: std::collections::HashSet<Seed> = (0..16).map(|_| random_seed()).collect();
        assert!(seeds.len() > 1);
    }

    #[test]
    fn timestamp_is_utc_with_z_suffix() {
        let ts = utc_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn generation_error_detail_is_truncated() {
        let err = generation_error(&"x".repeat(1000));
        let detail = err.to_string();
        assert!(detail.starts_with("Generation failed: "));
        assert_eq!(detail.len(), "Generation failed: ".len() + ERROR_DETAIL_MAX_CHARS);
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ProblemFieldError};

pub const PROMPT_MIN_CHARS: usize = 2;
pub const PROMPT_MAX_CHARS: usize = 280;
pub const SIZE_MIN: u32 = 256;
pub const SIZE_MAX: u32 = 1024;
pub const DEFAULT_SIZE: u32 = 768;

/// 生成图片固定的 MIME 类型
pub const PNG_MIME_TYPE: &str = "image/png";

/// 随机种子：接受 i64 与 u64 两种整数范围，回显时保持原值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum Seed {
    Signed(i64),
    Unsigned(u64),
}

impl Seed {
    /// 喂给伪随机数发生器的 64 位值；负数按补码解释。
    pub fn as_u64(self) -> u64 {
        match self {
            Seed::Signed(v) => v as u64,
            Seed::Unsigned(v) => v,
        }
    }
}

impl From<u32> for Seed {
    fn from(v: u32) -> Self {
        Seed::Signed(i64::from(v))
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Signed(v) => write!(f, "{v}"),
            Seed::Unsigned(v) => write!(f, "{v}"),
        }
    }
}

/// 图片生成请求体
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GenerateRequest {
    /// 提示词（2-280 个字符）
    #[schema(example = "A cat", min_length = 2, max_length = 280)]
    pub prompt: String,
    /// 宽度像素（256-1024，默认 768）
    #[serde(default = "default_size")]
    #[schema(example = 768, minimum = 256, maximum = 1024)]
    pub width: i64,
    /// 高度像素（256-1024，默认 768）
    #[serde(default = "default_size")]
    #[schema(example = 768, minimum = 256, maximum = 1024)]
    pub height: i64,
    /// 随机种子（i64 或 u64 范围内的整数）；缺省或 null 时由服务端随机分配
    #[serde(default)]
    #[schema(example = 42)]
    pub seed: Option<Seed>,
}

fn default_size() -> i64 {
    DEFAULT_SIZE as i64
}

/// 通过校验、可直接交给合成器的参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateParams {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub seed: Option<Seed>,
}

impl GenerateRequest {
    /// 字段级校验：一次性收集全部违规字段，任何违规都在合成之前拒绝。
    pub fn validate(self) -> Result<GenerateParams, AppError> {
        let mut errors = Vec::new();

        let prompt_chars = self.prompt.chars().count();
        if !(PROMPT_MIN_CHARS..=PROMPT_MAX_CHARS).contains(&prompt_chars) {
            errors.push(ProblemFieldError {
                field: "prompt".to_string(),
                message: format!(
                    "length must be between {PROMPT_MIN_CHARS} and {PROMPT_MAX_CHARS} characters (got {prompt_chars})"
                ),
            });
        }

        let width = check_size("width", self.width, &mut errors);
        let height = check_size("height", self.height, &mut errors);

        if !errors.is_empty() {
            return Err(AppError::InvalidFields(errors));
        }

        Ok(GenerateParams {
            prompt: self.prompt,
            width,
            height,
            seed: self.seed,
        })
    }
}

fn check_size(field: &str, value: i64, errors: &mut Vec<ProblemFieldError>) -> u32 {
    if (SIZE_MIN as i64..=SIZE_MAX as i64).contains(&value) {
        value as u32
    } else {
        errors.push(ProblemFieldError {
            field: field.to_string(),
            message: format!("must be between {SIZE_MIN} and {SIZE_MAX} (got {value})"),
        });
        0
    }
}

/// 图片生成响应
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GenerateResponse {
    /// PNG 字节的 base64（标准字母表，带填充）
    pub image_base64: String,
    /// 固定为 image/png
    #[schema(example = "image/png")]
    pub mime_type: String,
    #[schema(example = 768)]
    pub width: u32,
    #[schema(example = 768)]
    pub height: u32,
    /// 原样回显的提示词
    #[schema(example = "A cat")]
    pub prompt: String,
    /// 实际使用的种子（始终存在）
    #[schema(example = 42)]
    pub seed: Seed,
    /// 生成时间（ISO-8601 UTC，以 Z 结尾）
    #[schema(example = "2025-01-01T00:00:00.000000Z")]
    pub generated_at: String,
}

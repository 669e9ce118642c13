use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{Font as _, FontArc, FontVec, PxScale, ScaleFont};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use once_cell::sync::OnceCell;
use resvg::usvg::fontdb;

/// 内置点阵字体的单字宽高（像素）。
const BITMAP_GLYPH_PX: u32 = 8;

/// 字体候选加载失败原因（仅用于调试日志，不会向调用方暴露）。
#[derive(Debug, thiserror::Error)]
pub enum FontLoadError {
    #[error("未找到字体文件: {0}")]
    NotFound(String),
    #[error("读取字体失败 '{path}': {reason}")]
    Read { path: String, reason: String },
    #[error("字体格式无效 '{0}'")]
    Invalid(String),
}

/// 按名称查找的字体候选（如 `DejaVuSans.ttf`）。
#[derive(Debug, Clone)]
pub struct FontCandidate {
    file_name: String,
}

impl FontCandidate {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// 先查自定义字体目录，再查字体数据库中的系统字体。
    fn load(&self, fonts_dir: &Path, db: &fontdb::Database) -> Result<FontArc, FontLoadError> {
        let local = fonts_dir.join(&self.file_name);
        if local.is_file() {
            let data = fs::read(&local).map_err(|e| FontLoadError::Read {
                path: local.display().to_string(),
                reason: e.to_string(),
            })?;
            return FontVec::try_from_vec(data)
                .map(FontArc::new)
                .map_err(|_| FontLoadError::Invalid(local.display().to_string()));
        }

        let face = db
            .faces()
            .find(|face| {
                face_path(&face.source)
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case(&self.file_name))
            })
            .ok_or_else(|| FontLoadError::NotFound(self.file_name.clone()))?;

        db.with_face_data(face.id, |data, index| {
            FontVec::try_from_vec_and_index(data.to_vec(), index)
        })
        .ok_or_else(|| FontLoadError::NotFound(self.file_name.clone()))?
        .map(FontArc::new)
        .map_err(|_| FontLoadError::Invalid(self.file_name.clone()))
    }
}

fn face_path(source: &fontdb::Source) -> Option<&Path> {
    match source {
        fontdb::Source::File(path) => Some(path.as_path()),
        fontdb::Source::SharedFile(path, _) => Some(path.as_path()),
        fontdb::Source::Binary(_) => None,
    }
}

/// 字体解析器：按顺序尝试候选字体，全部失败时落到内置点阵字体。
///
/// 解析结果只计算一次并在进程内复用，之后的 [`FontResolver::resolve`] 不再触发磁盘 IO。
pub struct FontResolver {
    fonts_dir: PathBuf,
    candidates: Vec<FontCandidate>,
    db: Arc<fontdb::Database>,
    resolved: OnceCell<Option<(String, FontArc)>>,
}

impl FontResolver {
    pub fn new(
        fonts_dir: impl Into<PathBuf>,
        candidates: Vec<FontCandidate>,
        db: Arc<fontdb::Database>,
    ) -> Self {
        Self {
            fonts_dir: fonts_dir.into(),
            candidates,
            db,
            resolved: OnceCell::new(),
        }
    }

    /// 使用系统字体库构建解析器。
    pub fn with_system_fonts(fonts_dir: impl Into<PathBuf>, candidates: Vec<FontCandidate>) -> Self {
        let fonts_dir = fonts_dir.into();
        let db = build_font_db(&fonts_dir);
        Self::new(fonts_dir, candidates, Arc::new(db))
    }

    /// 只使用内置点阵字体（测试与无字体环境）。
    pub fn builtin_only() -> Self {
        Self::new(PathBuf::new(), Vec::new(), Arc::new(fontdb::Database::new()))
    }

    /// 命中的候选字体文件名；`None` 表示使用内置点阵字体。
    pub fn resolved_name(&self) -> Option<&str> {
        self.outline().map(|(name, _)| name.as_str())
    }

    /// 返回指定字号的可用字体，永不失败。
    pub fn resolve(&self, size: f32) -> TextFont {
        match self.outline() {
            Some((_, font)) => TextFont::Outline {
                font: font.clone(),
                scale: PxScale::from(size),
            },
            None => TextFont::Bitmap {
                scale: ((size as u32) / BITMAP_GLYPH_PX).max(1),
            },
        }
    }

    fn outline(&self) -> Option<&(String, FontArc)> {
        self.resolved
            .get_or_init(|| {
                for candidate in &self.candidates {
                    match candidate.load(&self.fonts_dir, &self.db) {
                        Ok(font) => {
                            tracing::info!("使用字体: {}", candidate.file_name());
                            return Some((candidate.file_name().to_string(), font));
                        }
                        Err(e) => tracing::debug!("字体候选不可用: {}", e),
                    }
                }
                tracing::warn!("未找到可用的候选字体，回退到内置点阵字体");
                None
            })
            .as_ref()
    }
}

/// 初始化字体数据库：系统字体 + 自定义字体目录。
fn build_font_db(fonts_dir: &Path) -> fontdb::Database {
    let mut font_db = fontdb::Database::new();
    font_db.load_system_fonts();

    if let Ok(entries) = fs::read_dir(fonts_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file()
                && (path.extension() == Some("ttf".as_ref())
                    || path.extension() == Some("otf".as_ref()))
                && let Err(e) = font_db.load_font_file(&path)
            {
                tracing::error!("加载字体文件失败 '{}': {}", path.display(), e);
            }
        }
    }

    font_db
}

/// 已解析、可直接绘制的字体。
#[derive(Clone)]
pub enum TextFont {
    /// TrueType/OpenType 轮廓字体
    Outline { font: FontArc, scale: PxScale },
    /// 内置 8x8 点阵字体，按整数倍放大
    Bitmap { scale: u32 },
}

impl TextFont {
    pub fn is_builtin(&self) -> bool {
        matches!(self, TextFont::Bitmap { .. })
    }

    /// 单行文本的 (宽, 高)，单位像素。
    pub fn measure_line(&self, text: &str) -> (u32, u32) {
        match self {
            TextFont::Outline { font, scale } => {
                let scaled = font.as_scaled(*scale);
                let mut width = 0.0f32;
                let mut prev = None;
                for c in text.chars() {
                    let glyph_id = scaled.glyph_id(c);
                    if let Some(prev_id) = prev {
                        width += scaled.kern(prev_id, glyph_id);
                    }
                    width += scaled.h_advance(glyph_id);
                    prev = Some(glyph_id);
                }
                (width.ceil() as u32, scaled.height().ceil() as u32)
            }
            TextFont::Bitmap { scale } => {
                let glyph = BITMAP_GLYPH_PX * scale;
                (glyph * text.chars().count() as u32, glyph)
            }
        }
    }

    /// 以 (x, y) 为左上角绘制单行文本。
    pub fn draw_line(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        match self {
            TextFont::Outline { font, scale } => {
                draw_text_mut(canvas, color, x, y, *scale, font, text);
            }
            TextFont::Bitmap { scale } => draw_bitmap_line(canvas, x, y, text, color, *scale),
        }
    }
}

fn draw_bitmap_line(canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: u32) {
    let scale_i = scale as i32;
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += BITMAP_GLYPH_PX as i32 * scale_i;
            continue;
        };
        for (row_idx, &row_bits) in glyph.iter().enumerate() {
            for col_idx in 0..BITMAP_GLYPH_PX as i32 {
                if (row_bits >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col_idx * scale_i;
                let py = y + row_idx as i32 * scale_i;
                for sy in 0..scale_i {
                    for sx in 0..scale_i {
                        let (tx, ty) = (px + sx, py + sy);
                        if tx >= 0 && ty >= 0 && tx < w && ty < h {
                            canvas.put_pixel(tx as u32, ty as u32, color);
                        }
                    }
                }
            }
        }
        cursor_x += BITMAP_GLYPH_PX as i32 * scale_i;
    }
}

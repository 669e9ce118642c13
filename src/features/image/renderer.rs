use image::imageops;
use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::font::{FontResolver, TextFont};
use super::wrap::wrap_text;

/// 单次请求内的栅格图像（RGB），编码后即丢弃。
pub type RenderedImage = RgbImage;

// 常量定义
const BACKGROUND: [u8; 3] = [10, 12, 26];
const GLOW_COUNT: usize = 3;
const GLOW_RADIUS_MIN_RATIO: f64 = 0.3;
const GLOW_RADIUS_MAX_RATIO: f64 = 0.6;
const GLOW_CHANNEL_MIN: u8 = 80;
const GLOW_CHANNEL_MAX: u8 = 180;
const GLOW_RADIAL_STRIDE: u32 = 2;
const CARD_MARGIN_RATIO: f64 = 0.08;
const CARD_FILL: [u8; 4] = [20, 24, 48, 180];
const CARD_BLUR_SIGMA: f32 = 0.5;
const TEXT_MAX_CHARS: usize = 32;
const TEXT_MIN_FONT_SIZE: u32 = 18;
const TEXT_FONT_RATIO: f64 = 0.04;
const TEXT_LINE_SPACING: u32 = 8;
const SHADOW_OFFSET: i64 = 2;
const SHADOW_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([230, 240, 255]);

/// 合成/编码阶段的错误
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid canvas size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("png encode error: {0}")]
    Encode(String),
}

impl From<png::EncodingError> for RenderError {
    fn from(err: png::EncodingError) -> Self {
        RenderError::Encode(err.to_string())
    }
}

/// 由提示词与种子程序化合成占位图：背景 → 3 个径向光斑 → 半透明卡片 → 居中文字。
///
/// 对固定的 (prompt, width, height, seed) 输出逐像素一致；随机数发生器只在本次调用内存在。
pub fn synthesize(
    prompt: &str,
    width: u32,
    height: u32,
    seed: u64,
    fonts: &FontResolver,
) -> Result<RenderedImage, RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidSize { width, height });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let short_side = width.min(height);

    let mut canvas = RgbImage::from_pixel(width, height, Rgb(BACKGROUND));

    paint_glows(&mut canvas, &mut rng, short_side);
    paint_card(&mut canvas, short_side);

    let font_size = TEXT_MIN_FONT_SIZE.max((short_side as f64 * TEXT_FONT_RATIO) as u32);
    let font = fonts.resolve(font_size as f32);
    let lines = wrap_text(prompt, TEXT_MAX_CHARS);
    paint_text(&mut canvas, &lines, &font);

    Ok(canvas)
}

fn paint_glows(canvas: &mut RgbImage, rng: &mut StdRng, short_side: u32) {
    let (width, height) = canvas.dimensions();
    let radius_min = (short_side as f64 * GLOW_RADIUS_MIN_RATIO) as u32;
    let radius_max = (short_side as f64 * GLOW_RADIUS_MAX_RATIO) as u32;

    for _ in 0..GLOW_COUNT {
        let cx = rng.gen_range(0..width);
        let cy = rng.gen_range(0..height);
        let radius = rng.gen_range(radius_min..=radius_max);
        let color = [
            rng.gen_range(GLOW_CHANNEL_MIN..=GLOW_CHANNEL_MAX),
            rng.gen_range(GLOW_CHANNEL_MIN..=GLOW_CHANNEL_MAX),
            255,
        ];
        if radius == 0 {
            continue;
        }

        let mask = radial_mask(radius);
        let glow = RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
            let Luma([a]) = *mask.get_pixel(x, y);
            Rgba([color[0], color[1], color[2], a])
        });
        composite(
            canvas,
            &glow,
            cx as i64 - radius as i64,
            cy as i64 - radius as i64,
        );
    }
}

/// 生成 `2R×2R` 的径向透明度遮罩。
///
/// 等价于从 `r = R` 开始、步长 2 向内逐层填充实心圆，每层灰度为 `⌊255·(r/R)²⌋`，
/// 内层覆盖外层；因此每个像素取覆盖它的最小一层的灰度，形成带状衰减。
pub fn radial_mask(radius: u32) -> GrayImage {
    let side = radius * 2;
    let r_min = if radius % GLOW_RADIAL_STRIDE == 0 {
        GLOW_RADIAL_STRIDE
    } else {
        1
    };
    let r_max_sq = radius as u64 * radius as u64;

    GrayImage::from_fn(side, side, |x, y| {
        let dx = x as i64 - radius as i64;
        let dy = y as i64 - radius as i64;
        let d_sq = (dx * dx + dy * dy) as u64;
        if d_sq > r_max_sq {
            return Luma([0]);
        }

        // 先用浮点估算层号，再做整数校正
        let d = (d_sq as f64).sqrt();
        let steps = ((radius as f64 - d) / GLOW_RADIAL_STRIDE as f64).floor().max(0.0) as u32;
        let mut r = radius
            .saturating_sub(steps * GLOW_RADIAL_STRIDE)
            .max(r_min);
        while (r as u64) * (r as u64) < d_sq {
            r += GLOW_RADIAL_STRIDE;
        }
        while r >= r_min + GLOW_RADIAL_STRIDE
            && ((r - GLOW_RADIAL_STRIDE) as u64).pow(2) >= d_sq
        {
            r -= GLOW_RADIAL_STRIDE;
        }

        let alpha = 255 * (r as u64) * (r as u64) / r_max_sq;
        Luma([alpha as u8])
    })
}

fn paint_card(canvas: &mut RgbImage, short_side: u32) {
    let (width, height) = canvas.dimensions();
    let margin = (short_side as f64 * CARD_MARGIN_RATIO) as u32;
    let card_w = width.saturating_sub(margin * 2);
    let card_h = height.saturating_sub(margin * 2);
    if card_w == 0 || card_h == 0 {
        return;
    }

    let card = RgbaImage::from_pixel(card_w, card_h, Rgba(CARD_FILL));
    let card = imageops::blur(&card, CARD_BLUR_SIGMA);
    composite(canvas, &card, margin as i64, margin as i64);
}

fn paint_text(canvas: &mut RgbImage, lines: &[String], font: &TextFont) {
    if lines.is_empty() {
        return;
    }
    let (width, height) = canvas.dimensions();

    let sizes: Vec<(u32, u32)> = lines.iter().map(|l| font.measure_line(l)).collect();
    let block_w = sizes.iter().map(|(w, _)| *w).max().unwrap_or(0);
    let block_h = sizes.iter().map(|(_, h)| *h).sum::<u32>()
        + TEXT_LINE_SPACING * (lines.len() as u32 - 1);

    let tx = (width as i64 - block_w as i64).div_euclid(2);
    let ty = (height as i64 - block_h as i64).div_euclid(2);

    // 先画阴影，再画正文
    for (offset, color) in [(SHADOW_OFFSET, SHADOW_COLOR), (0, TEXT_COLOR)] {
        let mut y = ty + offset;
        for (line, (line_w, line_h)) in lines.iter().zip(&sizes) {
            let x = tx + offset + (block_w - line_w) as i64 / 2;
            font.draw_line(canvas, x as i32, y as i32, line, color);
            y += (line_h + TEXT_LINE_SPACING) as i64;
        }
    }
}

/// 按图层自身 alpha 将 RGBA 图层混合到画布的 (ox, oy) 处，超出画布的部分裁剪掉。
pub fn composite(canvas: &mut RgbImage, layer: &RgbaImage, ox: i64, oy: i64) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    let x0 = ox.max(0);
    let y0 = oy.max(0);
    let x1 = (ox + layer.width() as i64).min(cw);
    let y1 = (oy + layer.height() as i64).min(ch);

    for y in y0..y1 {
        for x in x0..x1 {
            let Rgba([r, g, b, a]) = *layer.get_pixel((x - ox) as u32, (y - oy) as u32);
            if a == 0 {
                continue;
            }
            let dst = canvas.get_pixel_mut(x as u32, y as u32);
            dst.0 = [
                blend(dst.0[0], r, a),
                blend(dst.0[1], g, a),
                blend(dst.0[2], b, a),
            ];
        }
    }
}

#[inline]
fn blend(dst: u8, src: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((src as u32 * a + dst as u32 * (255 - a) + 127) / 255) as u8
}

/// 将栅格图像编码为 PNG（RGB8）。
pub fn encode_png(img: &RenderedImage, optimize_speed: bool) -> Result<Vec<u8>, RenderError> {
    let (width, height) = img.dimensions();
    let mut out = Vec::with_capacity((width * height) as usize);
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        if optimize_speed {
            encoder.set_compression(png::Compression::Fast);
            encoder.set_filter(png::FilterType::NoFilter);
        } else {
            encoder.set_compression(png::Compression::Default);
            encoder.set_filter(png::FilterType::Paeth);
        }
        let mut writer = encoder.write_header()?;
        writer.write_image_data(img.as_raw())?;
        writer.finish()?;
    }
    Ok(out)
}

/// 把生成参数变成 PNG 字节的渲染器；在阻塞线程池中调用。
pub trait ImageRenderer: Send + Sync {
    fn render_png(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
        seed: u64,
        fonts: &FontResolver,
    ) -> Result<Vec<u8>, RenderError>;
}

/// 默认渲染器：程序化合成后编码为 PNG。
#[derive(Debug, Clone, Copy, Default)]
pub struct ProceduralRenderer {
    pub optimize_speed: bool,
}

impl ImageRenderer for ProceduralRenderer {
    fn render_png(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
        seed: u64,
        fonts: &FontResolver,
    ) -> Result<Vec<u8>, RenderError> {
        let img = synthesize(prompt, width, height, seed, fonts)?;
        encode_png(&img, self.optimize_speed)
    }
}

use std::path::Path;
use std::sync::Arc;

use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result};
use gazex_core::TextMetrics;
use tiny_skia::{Color, Pixmap, PremultipliedColorU8};
use tracing::{debug, warn};

pub type SharedFont = Arc<FontVec>;

/// Places where a sans-serif font usually lives.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub fn load_font(path: &Path) -> Result<SharedFont> {
    let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    let font = FontVec::try_from_vec(bytes).with_context(|| format!("parsing font {}", path.display()))?;
    Ok(Arc::new(font))
}

/// Loads `path` if given, otherwise the first system font that parses.
pub fn find_font(path: Option<&Path>) -> Result<Option<SharedFont>> {
    if let Some(path) = path {
        return load_font(path).map(Some);
    }
    for candidate in SYSTEM_FONTS {
        let candidate = Path::new(candidate);
        if !candidate.exists() {
            continue;
        }
        match load_font(candidate) {
            Ok(font) => {
                debug!(font = %candidate.display(), "using system font");
                return Ok(Some(font));
            }
            Err(e) => warn!(font = %candidate.display(), error = %e, "unusable system font"),
        }
    }
    Ok(None)
}

fn layout(font: &FontVec, text: &str, size_px: f32) -> (Vec<Glyph>, f32) {
    let scale = PxScale::from(size_px);
    let sf = font.as_scaled(scale);
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::with_capacity(text.len());
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }
    (glyphs, pen_x)
}

/// Text measurement from the loaded font, so interest areas match what is
/// drawn.
#[derive(Clone)]
pub struct GlyphMetrics {
    font: SharedFont,
}

impl GlyphMetrics {
    pub fn new(font: SharedFont) -> Self {
        Self { font }
    }
}

impl TextMetrics for GlyphMetrics {
    fn measure(&self, text: &str, size_px: f32) -> (f32, f32) {
        let (_, width) = layout(&self.font, text, size_px);
        let height = self.font.as_scaled(PxScale::from(size_px)).height();
        (width, height)
    }
}

/// Rasterises one line of text into a transparent pixmap as wide as its
/// advance and as tall as the font's line, baseline at the ascent.
pub fn render_text_pixmap(text: &str, font_size: f32, font: &FontVec, color: Color) -> Option<Pixmap> {
    let (glyphs, advance) = layout(font, text, font_size);
    let line = font.as_scaled(PxScale::from(font_size)).height();

    let w = advance.ceil().max(1.0) as u32;
    let h = line.ceil().max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;

    let stride = w as usize;
    let dst = pm.pixels_mut();
    let cu = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];

    for g in glyphs {
        let Some(out) = font.outline_glyph(g) else {
            continue;
        };
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x).floor() as i32;
            let iy = (y as f32 + b.min.y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            let a_lin = (cov * cu[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a_lin * 255.0) as u8;
            let bg = dst[i];

            // Porter-Duff over in premultiplied space: out = src + bg * (1 - src.a)
            let inv = 1.0 - a_lin;
            let over = |src: u8, dst: u8| ((src as f32 * a_lin) as u8).saturating_add((dst as f32 * inv) as u8);
            let a = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            let (r, gr, bl) = (over(cu[0], bg.red()), over(cu[1], bg.green()), over(cu[2], bg.blue()));

            if let Some(px) = PremultipliedColorU8::from_rgba(r.min(a), gr.min(a), bl.min(a), a) {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

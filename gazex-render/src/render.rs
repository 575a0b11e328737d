use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bytemuck::{cast_slice, cast_slice_mut};
use gazex_core::scene::TextAnchor;
use gazex_core::{InterestArea, Point, Rgba, Scene, ScreenSize, Units, Visual};
use gazex_timing::{FrameStats, HighPrecisionTimer, Timer};
use image::imageops::FilterType;
use tiny_skia::{Color, ColorU8, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};
use tracing::{debug, warn};

use crate::text::{SharedFont, render_text_pixmap};

const OUTLINE_WIDTH: f32 = 2.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderStats {
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    /// The scene changed and the canvas was redrawn.
    pub redrawn: bool,
}

#[derive(Hash, PartialEq, Eq)]
struct TextKey {
    content: String,
    size_bits: u32,
    color: Rgba,
}

/// Rasterised text, keyed by content, size and colour.
struct TextCache {
    font: Option<SharedFont>,
    map: HashMap<TextKey, Arc<Pixmap>>,
    warned: bool,
}

impl TextCache {
    fn new(font: Option<SharedFont>) -> Self {
        Self {
            font,
            map: HashMap::new(),
            warned: false,
        }
    }

    fn get_or_render(&mut self, content: &str, size_px: f32, color: Rgba) -> Option<Arc<Pixmap>> {
        let key = TextKey {
            content: content.to_string(),
            size_bits: size_px.to_bits(),
            color,
        };
        if let Some(p) = self.map.get(&key) {
            return Some(Arc::clone(p));
        }
        let Some(font) = &self.font else {
            if !self.warned {
                warn!("no font loaded, text is not drawn");
                self.warned = true;
            }
            return None;
        };
        let pm = Arc::new(render_text_pixmap(
            content,
            size_px,
            font,
            Color::from_rgba8(color[0], color[1], color[2], color[3]),
        )?);
        self.map.insert(key, Arc::clone(&pm));
        Some(pm)
    }
}

/// Stimulus pictures scaled to the size they are shown at. Files that fail
/// to load are remembered so the warning is logged once.
#[derive(Default)]
struct ImageCache {
    map: HashMap<(PathBuf, u32, u32), Option<Arc<Pixmap>>>,
}

impl ImageCache {
    fn get_or_load(&mut self, path: &Path, w: u32, h: u32) -> Option<Arc<Pixmap>> {
        self.map
            .entry((path.to_path_buf(), w, h))
            .or_insert_with(|| match load_image(path, w, h) {
                Ok(pm) => Some(Arc::new(pm)),
                Err(e) => {
                    warn!(image = %path.display(), error = %e, "stimulus image not drawn");
                    None
                }
            })
            .clone()
    }
}

fn load_image(path: &Path, w: u32, h: u32) -> Result<Pixmap> {
    let img = image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .into_rgba8();
    let img = image::imageops::resize(&img, w, h, FilterType::Triangle);
    let mut pm = Pixmap::new(w, h).ok_or_else(|| anyhow!("empty image size {w}x{h}"))?;
    for (dst, src) in pm.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pm)
}

/// Draws [`Scene`]s onto an opaque canvas and copies it into a frame buffer.
/// Scenes are static between trial events, so the canvas is only redrawn
/// when the scene changes.
pub struct SceneRenderer {
    width: u32,
    height: u32,

    text_cache: TextCache,
    images: ImageCache,

    canvas: Pixmap,
    drawn: Option<Scene>,
    draw_timer: HighPrecisionTimer,
}

impl SceneRenderer {
    pub fn new(width: u32, height: u32, font: Option<SharedFont>) -> Result<Self> {
        let canvas = Pixmap::new(width, height).ok_or_else(|| anyhow!("invalid canvas size {width}x{height}"))?;
        Ok(Self {
            width,
            height,
            text_cache: TextCache::new(font),
            images: ImageCache::default(),
            canvas,
            drawn: None,
            draw_timer: HighPrecisionTimer::new(),
        })
    }

    pub fn size(&self) -> ScreenSize {
        ScreenSize::new(self.width, self.height)
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    /// Timing of the redraws done so far.
    pub fn draw_stats(&self) -> FrameStats {
        self.draw_timer.frame_stats()
    }

    /// Presentation pixels (centre origin, y up) to canvas pixels.
    fn to_canvas(&self, p: Point) -> (f32, f32) {
        let d = Units::Pix.to_device(p, self.size());
        (d.x as f32, d.y as f32)
    }

    /// Redraws the canvas if `scene` differs from what it holds.
    pub fn draw(&mut self, scene: &Scene) -> bool {
        if self.drawn.as_ref() == Some(scene) {
            return false;
        }
        let [r, g, b, a] = scene.background;
        self.canvas.fill(Color::from_rgba8(r, g, b, a));
        for visual in &scene.visuals {
            self.draw_visual(visual);
        }
        debug!(visuals = scene.visuals.len(), "scene drawn");
        self.drawn = Some(scene.clone());
        true
    }

    fn draw_visual(&mut self, visual: &Visual) {
        match visual {
            Visual::Image { path, center, size } => {
                let (w, h) = (size.0.round().max(1.0) as u32, size.1.round().max(1.0) as u32);
                if let Some(pm) = self.images.get_or_load(path, w, h) {
                    let (cx, cy) = self.to_canvas(*center);
                    self.blit(&pm, (cx - w as f32 * 0.5, cy - h as f32 * 0.5));
                }
            }
            Visual::Text {
                content,
                position,
                size_px,
                color,
                anchor,
            } => {
                if content.is_empty() {
                    return;
                }
                let Some(pm) = self.text_cache.get_or_render(content, *size_px, *color) else {
                    return;
                };
                let (x, y) = self.to_canvas(*position);
                let top = y - pm.height() as f32 * 0.5;
                let left = match anchor {
                    TextAnchor::Left => x,
                    TextAnchor::Center => x - pm.width() as f32 * 0.5,
                };
                self.blit(&pm, (left, top));
            }
            Visual::Outline { area, color } => self.stroke_area(area, *color),
        }
    }

    fn stroke_area(&mut self, area: &InterestArea, color: Rgba) {
        let Some(rect) = Rect::from_ltrb(
            area.left as f32,
            area.top as f32,
            area.right as f32,
            area.bottom as f32,
        ) else {
            return;
        };
        let path = PathBuilder::from_rect(rect);
        let mut paint = Paint::default();
        paint.anti_alias = false;
        paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
        let stroke = Stroke {
            width: OUTLINE_WIDTH,
            ..Stroke::default()
        };
        self.canvas
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    /// Composites a premultiplied pixmap with its top-left corner at `pos`,
    /// clipped to the canvas.
    fn blit(&mut self, pm: &Pixmap, pos: (f32, f32)) {
        let (w, h) = (pm.width() as i32, pm.height() as i32);
        let (cw, ch) = (self.width as i32, self.height as i32);
        let x = pos.0.floor() as i32;
        let y = pos.1.floor() as i32;

        if x + w <= 0 || y + h <= 0 || x >= cw || y >= ch {
            return;
        }

        let dst_x = x.max(0) as usize;
        let dst_y = y.max(0) as usize;
        let src_x = (-x).max(0) as usize;
        let src_y = (-y).max(0) as usize;
        let copy_w = (w as usize - src_x).min(cw as usize - dst_x);
        let copy_h = (h as usize - src_y).min(ch as usize - dst_y);

        let src_stride = w as usize;
        let dst_stride = cw as usize;
        let src_u32: &[u32] = cast_slice(pm.data());
        let dst_u32: &mut [u32] = cast_slice_mut(self.canvas.data_mut());

        for row in 0..copy_h {
            let s0 = (src_y + row) * src_stride + src_x;
            let d0 = (dst_y + row) * dst_stride + dst_x;
            let src = &src_u32[s0..s0 + copy_w];
            let dst = &mut dst_u32[d0..d0 + copy_w];

            if src.iter().all(|&s| s >> 24 == 0xFF) {
                dst.copy_from_slice(src);
                continue;
            }
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = over(s, *d);
            }
        }
    }

    /// Draws `scene` if needed and copies the canvas into `frame`, an RGBA
    /// buffer of the same size.
    pub fn render_frame<T: Timer>(&mut self, scene: &Scene, frame: &mut [u8], timer: &T) -> Result<RenderStats> {
        let t = timer.now();
        let redrawn = self.draw(scene);
        let draw = timer.elapsed(t);
        if redrawn {
            self.draw_timer.record_frame(draw);
        }

        let t = timer.now();
        let data = self.canvas.data();
        if frame.len() != data.len() {
            return Err(anyhow!(
                "frame buffer holds {} bytes, canvas {}",
                frame.len(),
                data.len()
            ));
        }
        // The canvas is opaque, so premultiplied and straight alpha agree.
        frame.copy_from_slice(data);
        let copy = timer.elapsed(t);

        Ok(RenderStats {
            draw,
            copy,
            total: draw + copy,
            redrawn,
        })
    }
}

/// Premultiplied source-over of two packed little-endian RGBA pixels.
fn over(s: u32, d: u32) -> u32 {
    let sa = s >> 24;
    let inv = 255 - sa;
    let mut out = 0u32;
    for shift in [0, 8, 16, 24] {
        let sc = (s >> shift) & 0xFF;
        let dc = (d >> shift) & 0xFF;
        let c = (sc + (dc * inv + 127) / 255).min(255);
        out |= c << shift;
    }
    out
}

#[cfg(test)]
mod tests {
    use gazex_core::scene::PILOT_OUTLINE;
    use gazex_timing::ManualTimer;

    use super::*;

    fn pixel(r: &SceneRenderer, x: u32, y: u32) -> [u8; 4] {
        let c = r.canvas().pixel(x, y).unwrap();
        [c.red(), c.green(), c.blue(), c.alpha()]
    }

    #[test]
    fn background_fills_the_canvas() {
        let mut r = SceneRenderer::new(64, 32, None).unwrap();
        assert!(r.draw(&Scene::blank([128, 128, 128, 255])));
        assert_eq!(pixel(&r, 0, 0), [128, 128, 128, 255]);
        assert_eq!(pixel(&r, 63, 31), [128, 128, 128, 255]);
    }

    #[test]
    fn unchanged_scene_is_not_redrawn() {
        let mut r = SceneRenderer::new(16, 16, None).unwrap();
        let scene = Scene::blank([0, 0, 0, 255]);
        assert!(r.draw(&scene));
        assert!(!r.draw(&scene));
        assert!(r.draw(&Scene::blank([1, 0, 0, 255])));
    }

    #[test]
    fn outline_strokes_area_edges() {
        let mut r = SceneRenderer::new(100, 100, None).unwrap();
        let area = InterestArea {
            id: 1,
            left: 20,
            top: 20,
            right: 80,
            bottom: 80,
            label: "IA1".into(),
        };
        let mut scene = Scene::blank([0, 0, 0, 255]);
        scene.outline_areas(&[area]);
        r.draw(&scene);
        assert_eq!(pixel(&r, 50, 20), PILOT_OUTLINE);
        assert_eq!(pixel(&r, 20, 50), PILOT_OUTLINE);
        assert_eq!(pixel(&r, 50, 50), [0, 0, 0, 255]);
    }

    #[test]
    fn text_without_font_is_skipped() {
        let mut r = SceneRenderer::new(50, 50, None).unwrap();
        let scene = Scene::message("hello", 20.0, [255, 255, 255, 255], [0, 0, 0, 255]);
        assert!(r.draw(&scene));
        assert_eq!(pixel(&r, 25, 25), [0, 0, 0, 255]);
    }

    #[test]
    fn image_is_scaled_and_centred() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let mut r = SceneRenderer::new(100, 100, None).unwrap();
        let scene = Scene::blank([0, 0, 0, 255]).with(Visual::Image {
            path,
            center: Point::new(-25.0, 25.0),
            size: (20.0, 20.0),
        });
        r.draw(&scene);
        // centre (-25, 25) is canvas (25, 25); the image covers 15..35
        assert_eq!(pixel(&r, 25, 25), [255, 0, 0, 255]);
        assert_eq!(pixel(&r, 15, 15), [255, 0, 0, 255]);
        assert_eq!(pixel(&r, 36, 25), [0, 0, 0, 255]);
        assert_eq!(pixel(&r, 75, 75), [0, 0, 0, 255]);
    }

    #[test]
    fn missing_image_leaves_the_background() {
        let mut r = SceneRenderer::new(20, 20, None).unwrap();
        let scene = Scene::blank([9, 9, 9, 255]).with(Visual::Image {
            path: "does/not/exist.png".into(),
            center: Point::new(0.0, 0.0),
            size: (10.0, 10.0),
        });
        r.draw(&scene);
        assert_eq!(pixel(&r, 10, 10), [9, 9, 9, 255]);
    }

    #[test]
    fn frame_copy_checks_buffer_size() {
        let mut r = SceneRenderer::new(8, 8, None).unwrap();
        let timer = ManualTimer::new();
        let scene = Scene::blank([1, 2, 3, 255]);

        let mut frame = vec![0u8; 8 * 8 * 4];
        let stats = r.render_frame(&scene, &mut frame, &timer).unwrap();
        assert!(stats.redrawn);
        assert_eq!(&frame[..4], &[1, 2, 3, 255]);
        assert!(!r.render_frame(&scene, &mut frame, &timer).unwrap().redrawn);

        let mut short = vec![0u8; 10];
        assert!(r.render_frame(&scene, &mut short, &timer).is_err());
    }

    #[test]
    fn blending_half_transparent_white_over_black() {
        let s = u32::from_le_bytes([128, 128, 128, 128]);
        let d = u32::from_le_bytes([0, 0, 0, 255]);
        assert_eq!(over(s, d).to_le_bytes(), [128, 128, 128, 255]);
    }
}

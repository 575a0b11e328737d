use std::path::Path;

use anyhow::{Context, Result, anyhow};
use gazex_core::{Scene, ScreenSize};
use tracing::debug;

use crate::render::SceneRenderer;
use crate::text::SharedFont;

/// Offscreen renderer that saves scenes as PNG files at the experiment's
/// screen resolution, for use as viewer backdrops.
pub struct PngBackdrop {
    renderer: SceneRenderer,
}

impl PngBackdrop {
    pub fn new(screen: ScreenSize, font: Option<SharedFont>) -> Result<Self> {
        Ok(Self {
            renderer: SceneRenderer::new(screen.width, screen.height, font)?,
        })
    }

    pub fn save(&mut self, scene: &Scene, path: &Path) -> Result<()> {
        self.renderer.draw(scene);
        let canvas = self.renderer.canvas();
        let img = image::RgbaImage::from_raw(canvas.width(), canvas.height(), canvas.data().to_vec())
            .ok_or_else(|| anyhow!("canvas does not match its size"))?;
        img.save(path)
            .with_context(|| format!("writing backdrop {}", path.display()))?;
        debug!(path = %path.display(), "backdrop saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gazex_core::Visual;
    use gazex_core::geometry::InterestArea;

    use super::*;

    #[test]
    fn saves_scene_at_screen_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("3_7.png");
        let mut backdrop = PngBackdrop::new(ScreenSize::new(40, 30), None).unwrap();
        let scene = Scene::blank([10, 20, 30, 255]).with(Visual::Outline {
            area: InterestArea {
                id: 1,
                left: 5,
                top: 5,
                right: 20,
                bottom: 20,
                label: "IA1".into(),
            },
            color: [255, 0, 0, 255],
        });
        backdrop.save(&scene, &path).unwrap();

        let img = image::open(&path).unwrap().into_rgba8();
        assert_eq!(img.dimensions(), (40, 30));
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30, 255]);
        assert_eq!(img.get_pixel(12, 5).0, [255, 0, 0, 255]);
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut backdrop = PngBackdrop::new(ScreenSize::new(4, 4), None).unwrap();
        let missing = dir.path().join("no_such_dir").join("1_1.png");
        assert!(backdrop.save(&Scene::blank([0, 0, 0, 255]), &missing).is_err());
    }
}

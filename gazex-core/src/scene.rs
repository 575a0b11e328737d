use std::path::PathBuf;

use crate::geometry::{InterestArea, Point};

pub type Rgba = [u8; 4];

pub const BLACK: Rgba = [0, 0, 0, 255];
pub const WHITE: Rgba = [255, 255, 255, 255];
pub const PILOT_OUTLINE: Rgba = [255, 0, 0, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAnchor {
    /// Position is the left end of the line, vertically centred.
    Left,
    #[default]
    Center,
}

/// Something drawn on the display. Positions are presentation pixels
/// (centre origin, y up).
#[derive(Debug, Clone, PartialEq)]
pub enum Visual {
    Image {
        path: PathBuf,
        center: Point,
        size: (f32, f32),
    },
    Text {
        content: String,
        position: Point,
        size_px: f32,
        color: Rgba,
        anchor: TextAnchor,
    },
    /// Outline of an interest area, drawn while piloting.
    Outline { area: InterestArea, color: Rgba },
}

impl Visual {
    pub fn is_text(&self) -> bool {
        matches!(self, Visual::Text { .. })
    }
}

/// Full description of one display frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub background: Rgba,
    pub visuals: Vec<Visual>,
    pub cursor_visible: bool,
}

impl Scene {
    pub fn blank(background: Rgba) -> Self {
        Self {
            background,
            visuals: Vec::new(),
            cursor_visible: false,
        }
    }

    /// Centred text screen, one visual per line.
    pub fn message(text: &str, size_px: f32, color: Rgba, background: Rgba) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let line_step = size_px * 1.5;
        let top = (lines.len().saturating_sub(1)) as f32 * line_step / 2.0;
        let visuals = lines
            .iter()
            .enumerate()
            .map(|(i, line)| Visual::Text {
                content: (*line).to_string(),
                position: Point::new(0.0, (top - i as f32 * line_step) as f64),
                size_px,
                color,
                anchor: TextAnchor::Center,
            })
            .collect();
        Self {
            background,
            visuals,
            cursor_visible: false,
        }
    }

    pub fn with(mut self, visual: Visual) -> Self {
        self.visuals.push(visual);
        self
    }

    pub fn outline_areas(&mut self, areas: &[InterestArea]) {
        self.visuals
            .extend(areas.iter().cloned().map(|area| Visual::Outline {
                area,
                color: PILOT_OUTLINE,
            }));
    }

    pub fn is_blank(&self) -> bool {
        self.visuals.is_empty()
    }
}

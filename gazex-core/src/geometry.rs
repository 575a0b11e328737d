//! Interest-area geometry.
//!
//! Two coordinate systems meet here. Stimuli are placed on the presentation
//! surface: origin at the screen centre, x to the right, y up, measured either
//! in pixels or in normalised units (-1..1 per axis). The tracker log uses
//! pixels with the origin at the top-left corner and y growing downwards.
//! Everything in this module is a pure function of its inputs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn w(&self) -> f64 {
        self.width as f64
    }

    fn h(&self) -> f64 {
        self.height as f64
    }

    /// Centre of the screen in device coordinates.
    pub fn device_center(&self) -> DevicePoint {
        DevicePoint {
            x: self.w() / 2.0,
            y: self.h() / 2.0,
        }
    }
}

/// Point on the presentation surface (centre origin, y up).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Point in tracker log coordinates (top-left origin, y down, pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DevicePoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Pix,
    Norm,
}

impl Units {
    pub fn to_device(self, p: Point, screen: ScreenSize) -> DevicePoint {
        let (w, h) = (screen.w(), screen.h());
        match self {
            Units::Pix => DevicePoint {
                x: p.x + w / 2.0,
                y: h / 2.0 - p.y,
            },
            Units::Norm => DevicePoint {
                x: (p.x + 1.0) * 0.5 * w,
                y: (1.0 - (p.y + 1.0) * 0.5) * h,
            },
        }
    }

    pub fn from_device(self, d: DevicePoint, screen: ScreenSize) -> Point {
        let (w, h) = (screen.w(), screen.h());
        match self {
            Units::Pix => Point {
                x: d.x - w / 2.0,
                y: h / 2.0 - d.y,
            },
            Units::Norm => Point {
                x: (2.0 * d.x) / w - 1.0,
                y: 1.0 - (2.0 * d.y) / h,
            },
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("unsupported image count {0}: the quadrant layout places 2 or 4 images")]
    UnsupportedImageCount(usize),
    #[error("interest area {index} needs {chars} characters but the text has none")]
    EmptyText { index: usize, chars: usize },
}

/// Rectangle in device pixels, ready for the tracker log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestArea {
    pub id: usize,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub label: String,
}

impl InterestArea {
    /// Device edges are truncated toward zero.
    pub fn from_corners(
        id: usize,
        top_left: DevicePoint,
        bottom_right: DevicePoint,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id,
            left: top_left.x as i32,
            top: top_left.y as i32,
            right: bottom_right.x as i32,
            bottom: bottom_right.y as i32,
            label: label.into(),
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Axis-aligned box on the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub right: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn around(center: Point, size: (f64, f64), padding: f64) -> Self {
        let half_w = size.0 / 2.0 + padding;
        let half_h = size.1 / 2.0 + padding;
        Self {
            left: center.x - half_w,
            right: center.x + half_w,
            lower: center.y - half_h,
            upper: center.y + half_h,
        }
    }

    /// Edges are inclusive.
    pub fn contains(&self, p: Point) -> bool {
        (self.left..=self.right).contains(&p.x) && (self.lower..=self.upper).contains(&p.y)
    }

    pub fn to_area(
        &self,
        id: usize,
        units: Units,
        screen: ScreenSize,
        label: impl Into<String>,
    ) -> InterestArea {
        let top_left = units.to_device(Point::new(self.left, self.upper), screen);
        let bottom_right = units.to_device(Point::new(self.right, self.lower), screen);
        InterestArea::from_corners(id, top_left, bottom_right, label)
    }
}

/// Interest area of an image centred at `center`.
pub fn image_area(
    id: usize,
    center: Point,
    size: (f64, f64),
    padding: f64,
    units: Units,
    screen: ScreenSize,
    label: impl Into<String>,
) -> InterestArea {
    Bounds::around(center, size, padding).to_area(id, units, screen, label)
}

/// Index of the first image whose bounds contain `p`.
pub fn hit_test(p: Point, centers: &[Point], size: (f64, f64)) -> Option<usize> {
    centers
        .iter()
        .position(|c| Bounds::around(*c, size, 0.0).contains(p))
}

/// Image centres for the two- or four-picture display, before shuffling.
pub fn quadrant_positions(count: usize, screen: ScreenSize) -> Result<Vec<Point>, GeometryError> {
    let offset_x = (screen.width / 4) as f64;
    let offset_y = (screen.height / 4) as f64;
    match count {
        2 => Ok(vec![Point::new(-offset_x, 0.0), Point::new(offset_x, 0.0)]),
        4 => Ok(vec![
            Point::new(-offset_x, offset_y),
            Point::new(-offset_x, -offset_y),
            Point::new(offset_x, -offset_y),
            Point::new(offset_x, offset_y),
        ]),
        other => Err(GeometryError::UnsupportedImageCount(other)),
    }
}

/// Width of each text segment from its character count, assuming every
/// character of the rendered line takes the same share of its width.
pub fn segment_widths(
    char_counts: &[usize],
    text_width: f64,
    text_len: usize,
) -> Result<Vec<f64>, GeometryError> {
    if text_len == 0 {
        if let Some((index, &chars)) = char_counts.iter().enumerate().find(|(_, c)| **c > 0) {
            return Err(GeometryError::EmptyText { index, chars });
        }
        return Ok(vec![0.0; char_counts.len()]);
    }
    let per_char = text_width / text_len as f64;
    Ok(char_counts.iter().map(|n| *n as f64 * per_char).collect())
}

/// Left and right edges of consecutive segments laid out from `start_x`.
/// Each segment starts where the previous one ended.
pub fn segment_edges(start_x: f64, widths: &[f64]) -> Vec<(f64, f64)> {
    let mut left = start_x;
    widths
        .iter()
        .map(|w| {
            let right = left + w;
            let edges = (left, right);
            left = right;
            edges
        })
        .collect()
}

/// Interest areas for a single line of text anchored on its left edge at
/// `start`. The vertical extent is the text height plus padding on both
/// sides of the baseline position.
pub fn text_areas(
    start: Point,
    widths: &[f64],
    text_height: f64,
    padding: f64,
    units: Units,
    screen: ScreenSize,
) -> Vec<InterestArea> {
    let upper = start.y + text_height + padding;
    let lower = start.y - text_height - padding;
    segment_edges(start.x, widths)
        .into_iter()
        .enumerate()
        .map(|(i, (left, right))| {
            Bounds {
                left,
                right,
                lower,
                upper,
            }
            .to_area(i + 1, units, screen, format!("IA{}", i + 1))
        })
        .collect()
}

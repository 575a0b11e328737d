/// Measures a single line of text as the display would draw it.
pub trait TextMetrics {
    /// Width and height in pixels of `text` at `size_px`.
    fn measure(&self, text: &str, size_px: f32) -> (f32, f32);
}

/// Fixed-advance approximation used when no font is loaded.
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMetrics {
    /// Advance of one character as a fraction of the font size.
    pub advance: f32,
    /// Line height as a fraction of the font size.
    pub line_height: f32,
}

impl Default for MonospaceMetrics {
    fn default() -> Self {
        // Courier New proportions
        Self {
            advance: 0.6,
            line_height: 1.13,
        }
    }
}

impl TextMetrics for MonospaceMetrics {
    fn measure(&self, text: &str, size_px: f32) -> (f32, f32) {
        let chars = text.chars().count() as f32;
        (chars * self.advance * size_px, self.line_height * size_px)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_scales_with_characters() {
        let m = MonospaceMetrics {
            advance: 0.5,
            line_height: 1.0,
        };
        assert_eq!(m.measure("abcd", 10.0), (20.0, 10.0));
        assert_eq!(m.measure("", 10.0).0, 0.0);
    }
}

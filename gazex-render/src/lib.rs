pub mod backdrop;
pub mod render;
pub mod text;

pub use backdrop::PngBackdrop;
pub use render::{RenderStats, SceneRenderer};
pub use text::{GlyphMetrics, SharedFont, find_font, load_font, render_text_pixmap};

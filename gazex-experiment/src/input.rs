use gazex_core::Point;

/// Keyboard and mouse input as the experiment sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Space,
    /// Operator skips the current trial.
    Escape,
    /// Operator ends the experiment (Ctrl+C).
    Abort,
    Key(String),
    /// Mouse click in presentation pixels.
    Click(Point),
}

impl Input {
    pub fn is_operator(&self) -> bool {
        matches!(self, Input::Escape | Input::Abort)
    }
}

pub mod geometry;
pub mod metrics;
pub mod phase;
pub mod scene;
pub mod trial;

pub use geometry::{DevicePoint, GeometryError, InterestArea, Point, ScreenSize, Units};
pub use metrics::{MonospaceMetrics, TextMetrics};
pub use phase::{Phase, StandardPhase};
pub use scene::{Rgba, Scene, Visual};
pub use trial::{Response, ResponseTime, TrialOutcome, TrialRecord, TrialState};

//! Eye-tracker control: the device seam, its text protocol, and the
//! recording session that owns the connection for a whole experiment.

pub mod dummy;
pub mod error;
pub mod protocol;
pub mod scripted;
pub mod session;
pub mod settings;
pub mod tracker;

pub use dummy::DummyTracker;
pub use error::TrackerError;
pub use protocol::{CalibrationType, Command, DataFilters, DriftOutcome, Message, RecordingFlags};
pub use scripted::{Call, CallLog, ScriptHandle, ScriptedTracker};
pub use session::{LinkStatus, RecordingSession, TrackerMode};
pub use settings::TrackerSettings;
pub use tracker::{Connector, NoLiveBackend, Tracker};

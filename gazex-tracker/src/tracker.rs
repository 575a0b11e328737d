use std::path::Path;

use crate::error::TrackerError;
use crate::protocol::{DriftOutcome, RecordingFlags};

/// Control surface of a gaze tracker, one call per vendor SDK entry point.
///
/// Commands and messages are plain ASCII lines; see [`crate::protocol`] for
/// the typed forms that render them.
pub trait Tracker {
    fn is_connected(&self) -> bool;

    /// Operator requested termination from the host PC.
    fn break_pressed(&mut self) -> bool;

    fn send_command(&mut self, command: &str) -> Result<(), TrackerError>;

    /// Appends an annotation to the device log stream.
    fn send_message(&mut self, message: &str) -> Result<(), TrackerError>;

    fn version_string(&mut self) -> Result<String, TrackerError>;

    fn open_data_file(&mut self, name: &str) -> Result<(), TrackerError>;

    fn close_data_file(&mut self) -> Result<(), TrackerError>;

    /// Copies the data file from the host PC to `local`.
    fn receive_data_file(&mut self, remote: &str, local: &Path) -> Result<(), TrackerError>;

    fn set_offline_mode(&mut self) -> Result<(), TrackerError>;

    /// Blocks while the host runs camera setup and calibration.
    fn do_tracker_setup(&mut self) -> Result<(), TrackerError>;

    fn exit_calibration(&mut self);

    /// One drift check at device pixel `(x, y)`.
    fn do_drift_correct(&mut self, x: i32, y: i32) -> Result<DriftOutcome, TrackerError>;

    fn start_recording(&mut self, flags: RecordingFlags) -> Result<(), TrackerError>;

    fn stop_recording(&mut self) -> Result<(), TrackerError>;

    fn is_recording(&self) -> bool;

    fn close(&mut self) -> Result<(), TrackerError>;
}

/// Opens a live tracker link.
pub trait Connector {
    fn connect(&self, address: &str) -> Result<Box<dyn Tracker>, TrackerError>;
}

/// Connector for builds without a vendor SDK binding; every attempt fails
/// so start-up goes through the dummy-mode fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiveBackend;

impl Connector for NoLiveBackend {
    fn connect(&self, address: &str) -> Result<Box<dyn Tracker>, TrackerError> {
        Err(TrackerError::Connect {
            address: address.to_string(),
            reason: "no live tracker backend in this build".to_string(),
        })
    }
}

use std::path::Path;

use tracing::{debug, trace};

use crate::error::TrackerError;
use crate::protocol::{DriftOutcome, RecordingFlags};
use crate::tracker::Tracker;

/// Stand-in used when no hardware is attached. Every call succeeds and
/// device traffic only shows up in the trace log.
#[derive(Debug)]
pub struct DummyTracker {
    connected: bool,
    recording: bool,
    messages: usize,
}

impl DummyTracker {
    pub fn new() -> Self {
        Self {
            connected: true,
            recording: false,
            messages: 0,
        }
    }

    /// Messages sent so far.
    pub fn message_count(&self) -> usize {
        self.messages
    }
}

impl Default for DummyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker for DummyTracker {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn break_pressed(&mut self) -> bool {
        false
    }

    fn send_command(&mut self, command: &str) -> Result<(), TrackerError> {
        trace!(command, "dummy command");
        Ok(())
    }

    fn send_message(&mut self, message: &str) -> Result<(), TrackerError> {
        self.messages += 1;
        trace!(message, "dummy message");
        Ok(())
    }

    fn version_string(&mut self) -> Result<String, TrackerError> {
        Ok("EYELINK DUMMY 0.0".to_string())
    }

    fn open_data_file(&mut self, name: &str) -> Result<(), TrackerError> {
        debug!(name, "dummy tracker ignores data file");
        Ok(())
    }

    fn close_data_file(&mut self) -> Result<(), TrackerError> {
        Ok(())
    }

    fn receive_data_file(&mut self, remote: &str, local: &Path) -> Result<(), TrackerError> {
        debug!(remote, local = %local.display(), "dummy tracker has no data file to send");
        Ok(())
    }

    fn set_offline_mode(&mut self) -> Result<(), TrackerError> {
        self.recording = false;
        Ok(())
    }

    fn do_tracker_setup(&mut self) -> Result<(), TrackerError> {
        Ok(())
    }

    fn exit_calibration(&mut self) {}

    fn do_drift_correct(&mut self, _x: i32, _y: i32) -> Result<DriftOutcome, TrackerError> {
        Ok(DriftOutcome::Accepted)
    }

    fn start_recording(&mut self, _flags: RecordingFlags) -> Result<(), TrackerError> {
        self.recording = true;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), TrackerError> {
        self.recording = false;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn close(&mut self) -> Result<(), TrackerError> {
        self.connected = false;
        self.recording = false;
        Ok(())
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{CalibrationType, RecordingFlags};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Host PC address of the tracker.
    pub address: String,
    pub sample_rate: u32,
    pub calibration_type: CalibrationType,
    pub preamble: String,
    pub recording: RecordingFlags,
    /// Wait before stopping a recording so trailing events reach the file.
    pub grace_delay_ms: u64,
    /// Pause inside the trial-variable burst so the host keeps up.
    pub message_pump_ms: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            address: "100.1.1.1".to_string(),
            sample_rate: 1000,
            calibration_type: CalibrationType::HV5,
            preamble: String::new(),
            recording: RecordingFlags::default(),
            grace_delay_ms: 100,
            message_pump_ms: 50,
        }
    }
}

impl TrackerSettings {
    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn message_pump(&self) -> Duration {
        Duration::from_millis(self.message_pump_ms)
    }
}

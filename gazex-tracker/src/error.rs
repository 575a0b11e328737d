use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("could not connect to tracker at {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("operator declined dummy mode after connection failure")]
    FallbackDeclined {
        #[source]
        source: Box<TrackerError>,
    },

    #[error("tracker link is not connected")]
    NotConnected,

    #[error("tracker session already closed")]
    Closed,

    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("message `{message}` failed: {reason}")]
    Message { message: String, reason: String },

    #[error("data file {name} could not be opened: {reason}")]
    OpenDataFile { name: String, reason: String },

    #[error("data file could not be closed: {reason}")]
    CloseDataFile { reason: String },

    #[error("transfer of {remote} to {} failed: {reason}", local.display())]
    Transfer {
        remote: String,
        local: PathBuf,
        reason: String,
    },

    #[error("recording could not start: {reason}")]
    StartRecording { reason: String },

    #[error("recording already active")]
    AlreadyRecording,

    #[error("drift check failed: {reason}")]
    DriftCheck { reason: String },

    #[error("tracker setup failed: {reason}")]
    Setup { reason: String },

    #[error("unreadable tracker version string {0:?}")]
    Version(String),

    #[error("unknown calibration type {0:?}")]
    CalibrationType(String),
}

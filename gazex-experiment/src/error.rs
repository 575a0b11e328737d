use std::path::PathBuf;

use gazex_core::GeometryError;
use gazex_tracker::TrackerError;

#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("condition file {}: {source}", path.display())]
    Conditions {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("condition file {} has no trials", path.display())]
    NoTrials { path: PathBuf },

    #[error("trial is missing column `{0}`")]
    MissingColumn(String),

    #[error("column `{column}` holds {value:?}, expected a whole number")]
    NotANumber { column: String, value: String },

    #[error("participant {participant} already has data at {}", path.display())]
    ParticipantInUse { participant: String, path: PathBuf },

    #[error("condition column `{0}` clashes with a behavioral log column")]
    ReservedColumn(String),

    #[error("behavioral log {}: {source}", path.display())]
    Behavioral {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

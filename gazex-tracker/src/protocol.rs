//! Command and message strings understood by the tracker host and by the
//! offline log viewer. The rendered text is part of the viewer's integration
//! protocol and must not change.

use std::fmt;
use std::str::FromStr;

use gazex_core::{InterestArea, Rgba, ScreenSize, TrialOutcome};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Calibration grid: horizontal only or horizontal/vertical with N points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CalibrationType {
    H3,
    HV3,
    #[default]
    HV5,
    HV9,
    HV13,
}

impl CalibrationType {
    pub fn as_str(self) -> &'static str {
        match self {
            CalibrationType::H3 => "H3",
            CalibrationType::HV3 => "HV3",
            CalibrationType::HV5 => "HV5",
            CalibrationType::HV9 => "HV9",
            CalibrationType::HV13 => "HV13",
        }
    }
}

impl fmt::Display for CalibrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalibrationType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "H3" => CalibrationType::H3,
            "HV3" => CalibrationType::HV3,
            "HV5" => CalibrationType::HV5,
            "HV9" => CalibrationType::HV9,
            "HV13" => CalibrationType::HV13,
            _ => return Err(TrackerError::CalibrationType(s.to_string())),
        })
    }
}

impl TryFrom<String> for CalibrationType {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CalibrationType> for String {
    fn from(value: CalibrationType) -> Self {
        value.as_str().to_string()
    }
}

/// The four independent recording toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingFlags {
    pub samples_to_file: bool,
    pub events_to_file: bool,
    pub samples_over_link: bool,
    pub events_over_link: bool,
}

impl Default for RecordingFlags {
    fn default() -> Self {
        Self {
            samples_to_file: true,
            events_to_file: true,
            samples_over_link: true,
            events_over_link: true,
        }
    }
}

/// Result of one drift check attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftOutcome {
    Accepted,
    /// Participant or operator pressed escape; the check is repeated.
    Escaped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SampleRate(u32),
    RecordingParseGaze,
    SelectParserConfiguration(u8),
    CalibrationType(CalibrationType),
    ScreenPixelCoords(ScreenSize),
    FileEventFilter(&'static str),
    FileSampleData(&'static str),
    LinkEventFilter(&'static str),
    LinkSampleData(&'static str),
    RecordStatusMessage(String),
    AddFilePreambleText(String),
    ClearScreen(u8),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SampleRate(hz) => write!(f, "sample_rate {hz}"),
            Command::RecordingParseGaze => f.write_str("recording_parse_type = GAZE"),
            Command::SelectParserConfiguration(n) => write!(f, "select_parser_configuration {n}"),
            Command::CalibrationType(t) => write!(f, "calibration_type = {t}"),
            Command::ScreenPixelCoords(s) => write!(
                f,
                "screen_pixel_coords = 0 0 {} {}",
                s.width.saturating_sub(1),
                s.height.saturating_sub(1)
            ),
            Command::FileEventFilter(flags) => write!(f, "file_event_filter = {flags}"),
            Command::FileSampleData(flags) => write!(f, "file_sample_data = {flags}"),
            Command::LinkEventFilter(flags) => write!(f, "link_event_filter = {flags}"),
            Command::LinkSampleData(flags) => write!(f, "link_sample_data = {flags}"),
            Command::RecordStatusMessage(text) => write!(f, "record_status_message '{text}'"),
            Command::AddFilePreambleText(text) => write!(f, "add_file_preamble_text '{text}'"),
            Command::ClearScreen(colour) => write!(f, "clear_screen {colour}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    TrialId(u32),
    TrialResult(TrialOutcome),
    InterestArea(InterestArea),
    TrialVar { name: String, value: String },
    ImageLoad(String),
    Clear(Rgba),
    DisplayCoords(ScreenSize),
    Marker(String),
}

impl Message {
    pub fn marker(text: impl Into<String>) -> Self {
        Message::Marker(text.into())
    }

    pub fn trial_var(name: impl Into<String>, value: impl fmt::Display) -> Self {
        Message::TrialVar {
            name: name.into(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::TrialId(n) => write!(f, "TRIALID {n}"),
            Message::TrialResult(outcome) => write!(f, "TRIAL_RESULT {}", outcome.code()),
            Message::InterestArea(a) => write!(
                f,
                "!V IAREA RECTANGLE {} {} {} {} {} {}",
                a.id, a.left, a.top, a.right, a.bottom, a.label
            ),
            Message::TrialVar { name, value } => write!(f, "!V TRIAL_VAR {name} {value}"),
            Message::ImageLoad(path) => write!(f, "!V IMGLOAD FILL {path}"),
            Message::Clear([r, g, b, _]) => write!(f, "!V CLEAR {r} {g} {b}"),
            Message::DisplayCoords(s) => write!(
                f,
                "DISPLAY_COORDS 0 0 {} {}",
                s.width.saturating_sub(1),
                s.height.saturating_sub(1)
            ),
            Message::Marker(text) => f.write_str(text),
        }
    }
}

/// Which events and sample fields the host stores and streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFilters {
    pub file_events: &'static str,
    pub file_samples: &'static str,
    pub link_events: &'static str,
    pub link_samples: &'static str,
}

impl DataFilters {
    /// Trackers after major version 3 also report head-target data.
    pub fn for_version(major: u32) -> Self {
        let (file_samples, link_samples) = if major > 3 {
            (
                "LEFT,RIGHT,GAZE,HREF,RAW,AREA,HTARGET,GAZERES,BUTTON,STATUS,INPUT",
                "LEFT,RIGHT,GAZE,GAZERES,AREA,HTARGET,STATUS,INPUT",
            )
        } else {
            (
                "LEFT,RIGHT,GAZE,HREF,RAW,AREA,GAZERES,BUTTON,STATUS,INPUT",
                "LEFT,RIGHT,GAZE,GAZERES,AREA,STATUS,INPUT",
            )
        };
        Self {
            file_events: "LEFT,RIGHT,FIXATION,SACCADE,BLINK,MESSAGE,BUTTON,INPUT",
            file_samples,
            link_events: "LEFT,RIGHT,FIXATION,SACCADE,BLINK,BUTTON,FIXUPDATE,INPUT",
            link_samples,
        }
    }

    pub fn commands(&self) -> [Command; 4] {
        [
            Command::FileEventFilter(self.file_events),
            Command::FileSampleData(self.file_samples),
            Command::LinkEventFilter(self.link_events),
            Command::LinkSampleData(self.link_samples),
        ]
    }
}

/// Major version from a host version string such as `"EYELINK CL 5.12"`.
pub fn parse_major_version(version: &str) -> Result<u32, TrackerError> {
    version
        .split_whitespace()
        .last()
        .and_then(|v| v.split('.').next())
        .and_then(|major| major.parse().ok())
        .ok_or_else(|| TrackerError::Version(version.to_string()))
}

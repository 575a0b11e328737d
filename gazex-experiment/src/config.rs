use std::path::{Path, PathBuf};

use gazex_core::scene::{BLACK, WHITE};
use gazex_core::{Point, Rgba, ScreenSize, Units};
use gazex_tracker::TrackerSettings;
use serde::{Deserialize, Serialize};

use crate::error::ExperimentError;

/// Everything that varies between experiments built on the trial runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub name: String,
    pub screen: ScreenSize,
    pub units: Units,
    pub background: Rgba,
    pub foreground: Rgba,
    pub message_size_px: f32,
    pub messages: Messages,
    pub conditions: PathBuf,
    /// Optional practice block, run before the main block.
    pub practice_conditions: Option<PathBuf>,
    /// Device data files land in `<results_dir>/pp_<participant>/`.
    pub results_dir: PathBuf,
    pub behavioral_dir: PathBuf,
    /// Condition columns sent as trial variables; every column when unset.
    pub trial_vars: Option<Vec<String>>,
    /// Draw interest-area outlines over the stimulus.
    pub pilot_areas: bool,
    pub inter_trial_interval_ms: u64,
    pub tracker: TrackerSettings,
    pub paradigm: ParadigmConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "experiment".to_string(),
            screen: ScreenSize::new(1920, 1080),
            units: Units::Pix,
            background: [128, 128, 128, 255],
            foreground: BLACK,
            message_size_px: 28.0,
            messages: Messages::default(),
            conditions: PathBuf::from("conditions.csv"),
            practice_conditions: None,
            results_dir: PathBuf::from("results"),
            behavioral_dir: PathBuf::from("behavioral"),
            trial_vars: None,
            pilot_areas: false,
            inter_trial_interval_ms: 0,
            tracker: TrackerSettings::default(),
            paradigm: ParadigmConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub welcome: String,
    pub tracker_instructions: String,
    pub instructions: String,
    pub practice: String,
    pub goodbye: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            welcome: "Welcome to the experiment!\n\nPress SPACE to continue.".to_string(),
            tracker_instructions: "We will now set up the eye tracker.\n\nPress SPACE to continue."
                .to_string(),
            instructions: "Follow the instructions of the experimenter.\n\nPress SPACE to start."
                .to_string(),
            practice: "First, a few practice trials.\n\nPress SPACE to start.".to_string(),
            goodbye: "Thank you for participating!\n\nPress SPACE to exit.".to_string(),
        }
    }
}

impl Messages {
    fn first_empty(&self) -> Option<&'static str> {
        [
            ("welcome", &self.welcome),
            ("tracker_instructions", &self.tracker_instructions),
            ("instructions", &self.instructions),
            ("practice", &self.practice),
            ("goodbye", &self.goodbye),
        ]
        .into_iter()
        .find(|(_, text)| text.trim().is_empty())
        .map(|(name, _)| name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParadigmConfig {
    VisualWorld(VisualWorldConfig),
    Reading(ReadingConfig),
}

impl Default for ParadigmConfig {
    fn default() -> Self {
        ParadigmConfig::VisualWorld(VisualWorldConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Participant clicks the mentioned object.
    #[default]
    Click,
    /// Participant only looks and listens.
    Look,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualWorldConfig {
    pub image_count: usize,
    pub image_size: (f64, f64),
    pub ia_padding: f64,
    pub preview_ms: u64,
    pub task: Task,
    /// Response window after target offset; `None` waits for a click.
    pub timeout_ms: Option<u64>,
    /// Folder holding images and sound clips named in the condition file.
    pub stimulus_dir: PathBuf,
    pub image_extension: String,
    pub audio_extension: String,
}

impl Default for VisualWorldConfig {
    fn default() -> Self {
        Self {
            image_count: 4,
            image_size: (198.0, 198.0),
            ia_padding: 0.0,
            preview_ms: 1500,
            task: Task::Click,
            timeout_ms: Some(1000),
            stimulus_dir: PathBuf::from("stimuli"),
            image_extension: "png".to_string(),
            audio_extension: "wav".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    /// Left end of the sentence, in the experiment's units.
    pub text_start: Point,
    pub font_size_px: f32,
    pub text_color: Rgba,
    pub ia_padding: f64,
    pub ia_count: usize,
    pub timeout_ms: Option<u64>,
    /// Save each stimulus frame as a backdrop for the log viewer.
    pub backdrops: bool,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            text_start: Point::new(-200.0, 0.0),
            font_size_px: 14.0,
            text_color: WHITE,
            ia_padding: 30.0,
            ia_count: 3,
            timeout_ms: None,
            backdrops: true,
        }
    }
}

impl ExperimentConfig {
    pub fn from_path(path: &Path) -> Result<Self, ExperimentError> {
        let text = std::fs::read_to_string(path).map_err(|source| ExperimentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ExperimentConfig =
            serde_json::from_str(&text).map_err(|source| ExperimentError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.screen.width == 0 || self.screen.height == 0 {
            return Err(ExperimentError::InvalidConfig(
                "screen size must be non-zero".to_string(),
            ));
        }
        if let Some(name) = self.messages.first_empty() {
            return Err(ExperimentError::InvalidConfig(format!(
                "message `{name}` is empty"
            )));
        }
        match &self.paradigm {
            ParadigmConfig::VisualWorld(vwp) => {
                if !matches!(vwp.image_count, 2 | 4) {
                    return Err(ExperimentError::InvalidConfig(format!(
                        "image_count must be 2 or 4, got {}",
                        vwp.image_count
                    )));
                }
            }
            ParadigmConfig::Reading(reading) => {
                if reading.ia_count == 0 {
                    return Err(ExperimentError::InvalidConfig(
                        "ia_count must be at least 1".to_string(),
                    ));
                }
                if reading.font_size_px <= 0.0 {
                    return Err(ExperimentError::InvalidConfig(
                        "font_size_px must be positive".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Folder for this participant's device data file and backdrops.
    pub fn participant_dir(&self, participant: &str) -> PathBuf {
        self.results_dir.join(format!("pp_{participant}"))
    }

    /// Local destination of the device data file.
    pub fn data_file_path(&self, participant: &str) -> PathBuf {
        self.participant_dir(participant)
            .join(format!("{participant}.EDF"))
    }
}

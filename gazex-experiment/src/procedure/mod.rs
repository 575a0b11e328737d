//! Paradigm-specific parts of a trial: layout, what happens after onset and
//! which responses end the presentation.

pub mod reading;
pub mod vwp;

use std::path::Path;
use std::time::Duration;

use gazex_core::{DevicePoint, InterestArea, Point, Response, Rgba, Scene, ScreenSize, TextMetrics, Units};
use gazex_timing::Timer;
use gazex_tracker::{Message, RecordingSession};
use rand::Rng;

use crate::conditions::TrialRow;
use crate::config::ParadigmConfig;
use crate::error::ExperimentError;
use crate::input::Input;

pub use reading::Reading;
pub use vwp::VisualWorld;

/// Sound output. `play` starts a clip and returns its duration; the caller
/// waits for it to finish.
pub trait AudioPlayer {
    fn play(&mut self, clip: &Path) -> Duration;
}

pub type BackdropError = Box<dyn std::error::Error + Send + Sync>;

/// Saves a picture of a scene for the offline viewer.
pub trait Backdrop {
    fn save(&mut self, scene: &Scene, path: &Path) -> Result<(), BackdropError>;
}

/// What a procedure needs to know about the trial it lays out.
#[derive(Debug, Clone)]
pub struct TrialContext<'a> {
    pub trial_id: u32,
    pub participant: &'a str,
    pub screen: ScreenSize,
    pub units: Units,
    pub background: Rgba,
    pub pilot_areas: bool,
}

impl TrialContext<'_> {
    /// Converts a point in the experiment's units to presentation pixels.
    pub fn to_pixels(&self, p: Point) -> Point {
        Units::Pix.from_device(self.units.to_device(p, self.screen), self.screen)
    }
}

/// Layout of one trial, fixed before the drift check.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialPlan {
    pub scene: Scene,
    pub areas: Vec<InterestArea>,
    pub drift_target: DevicePoint,
    /// Save the stimulus scene as a viewer backdrop.
    pub backdrop: bool,
}

/// Handle given to a procedure while its trial is recording.
pub struct Stage<'a, T: Timer> {
    session: &'a mut RecordingSession<T>,
    audio: &'a mut dyn AudioPlayer,
    scene: &'a mut Scene,
    clock: &'a mut T::Timestamp,
}

impl<'a, T: Timer> Stage<'a, T> {
    pub fn new(
        session: &'a mut RecordingSession<T>,
        audio: &'a mut dyn AudioPlayer,
        scene: &'a mut Scene,
        clock: &'a mut T::Timestamp,
    ) -> Self {
        Self {
            session,
            audio,
            scene,
            clock,
        }
    }

    pub fn marker(&mut self, text: &str) -> Result<(), ExperimentError> {
        self.session.send_message(&Message::marker(text))?;
        Ok(())
    }

    /// Plays `clip` and blocks until it has finished.
    pub fn play(&mut self, clip: &Path) {
        let duration = self.audio.play(clip);
        self.session.timer().sleep(duration);
    }

    pub fn show(&mut self, scene: Scene) {
        *self.scene = scene;
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        self.scene
    }

    /// Restarts the response clock.
    pub fn reset_clock(&mut self) {
        *self.clock = self.session.timer().now();
    }

    /// Time since the response clock was last reset.
    pub fn clock(&self) -> Duration {
        self.session.timer().elapsed(*self.clock)
    }
}

/// One experimental paradigm plugged into the trial runner.
pub trait Procedure {
    /// Behavioral columns written after the condition columns.
    fn response_columns(&self) -> &'static [&'static str];

    fn prepare<R: Rng + ?Sized>(
        &mut self,
        row: &TrialRow,
        ctx: &TrialContext<'_>,
        rng: &mut R,
    ) -> Result<TrialPlan, ExperimentError>;

    /// Recording has started: show the stimulus and mark its onset.
    fn onset<T: Timer>(&mut self, stage: &mut Stage<'_, T>) -> Result<(), ExperimentError>;

    /// Called once per tick while recording.
    fn poll<T: Timer>(&mut self, stage: &mut Stage<'_, T>) -> Result<Option<Response>, ExperimentError>;

    /// Participant input while recording. Operator hotkeys never get here.
    fn input<T: Timer>(
        &mut self,
        input: &Input,
        stage: &mut Stage<'_, T>,
    ) -> Result<Option<Response>, ExperimentError>;

    /// Values for [`Procedure::response_columns`], in that order.
    fn response_values(&self, response: &Response) -> Vec<(String, String)>;
}

/// The paradigms shipped with the runner.
pub enum Paradigm {
    VisualWorld(VisualWorld),
    Reading(Reading),
}

impl Paradigm {
    pub fn from_config(config: &ParadigmConfig, metrics: Box<dyn TextMetrics>) -> Self {
        match config {
            ParadigmConfig::VisualWorld(vwp) => Paradigm::VisualWorld(VisualWorld::new(vwp.clone())),
            ParadigmConfig::Reading(reading) => Paradigm::Reading(Reading::new(reading.clone(), metrics)),
        }
    }
}

impl Procedure for Paradigm {
    fn response_columns(&self) -> &'static [&'static str] {
        match self {
            Paradigm::VisualWorld(p) => p.response_columns(),
            Paradigm::Reading(p) => p.response_columns(),
        }
    }

    fn prepare<R: Rng + ?Sized>(
        &mut self,
        row: &TrialRow,
        ctx: &TrialContext<'_>,
        rng: &mut R,
    ) -> Result<TrialPlan, ExperimentError> {
        match self {
            Paradigm::VisualWorld(p) => p.prepare(row, ctx, rng),
            Paradigm::Reading(p) => p.prepare(row, ctx, rng),
        }
    }

    fn onset<T: Timer>(&mut self, stage: &mut Stage<'_, T>) -> Result<(), ExperimentError> {
        match self {
            Paradigm::VisualWorld(p) => p.onset(stage),
            Paradigm::Reading(p) => p.onset(stage),
        }
    }

    fn poll<T: Timer>(&mut self, stage: &mut Stage<'_, T>) -> Result<Option<Response>, ExperimentError> {
        match self {
            Paradigm::VisualWorld(p) => p.poll(stage),
            Paradigm::Reading(p) => p.poll(stage),
        }
    }

    fn input<T: Timer>(
        &mut self,
        input: &Input,
        stage: &mut Stage<'_, T>,
    ) -> Result<Option<Response>, ExperimentError> {
        match self {
            Paradigm::VisualWorld(p) => p.input(input, stage),
            Paradigm::Reading(p) => p.input(input, stage),
        }
    }

    fn response_values(&self, response: &Response) -> Vec<(String, String)> {
        match self {
            Paradigm::VisualWorld(p) => p.response_values(response),
            Paradigm::Reading(p) => p.response_values(response),
        }
    }
}

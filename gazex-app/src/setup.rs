use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use gazex_core::{MonospaceMetrics, Scene, TextMetrics};
use gazex_experiment::behavioral::check_participant;
use gazex_experiment::{
    AudioPlayer, Backdrop, BackdropError, BehavioralLog, ExperimentConfig, ExperimentStateMachine, Paradigm,
    RunnerSettings, TrialList, TrialRunner,
};
use gazex_render::{GlyphMetrics, PngBackdrop, SharedFont, find_font};
use gazex_timing::HighPrecisionTimer;
use gazex_tracker::{NoLiveBackend, RecordingSession, TrackerError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::Cli;

pub type Experiment = ExperimentStateMachine<HighPrecisionTimer, Paradigm, StdRng>;

pub struct Startup {
    pub experiment: Experiment,
    pub font: Option<SharedFont>,
}

/// Reports every clip as lasting a fixed time; nothing is played.
struct SilentAudio {
    clip: Duration,
    warned: bool,
}

impl AudioPlayer for SilentAudio {
    fn play(&mut self, clip: &Path) -> Duration {
        if !self.warned {
            warn!(clip_ms = self.clip.as_millis() as u64, "no audio output, clips are timed only");
            self.warned = true;
        }
        debug!(clip = %clip.display(), "clip");
        self.clip
    }
}

struct RenderedBackdrop(PngBackdrop);

impl Backdrop for RenderedBackdrop {
    fn save(&mut self, scene: &Scene, path: &Path) -> Result<(), BackdropError> {
        self.0.save(scene, path).map_err(Into::into)
    }
}

fn load_config(cli: &Cli) -> Result<ExperimentConfig> {
    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::from_path(path)?,
        None => ExperimentConfig::default(),
    };
    if let Some(path) = &cli.conditions {
        config.conditions = path.clone();
    }
    if let Some(path) = &cli.practice {
        config.practice_conditions = Some(path.clone());
    }
    if let Some(address) = &cli.tracker_address {
        config.tracker.address = address.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Asks the operator on the terminal whether to go on without the tracker.
fn confirm_dummy(err: &TrackerError) -> bool {
    eprint!("Could not connect to the eye tracker ({err}).\nContinue in dummy mode? [y/N] ");
    // Best-effort flush so the prompt shows before the read.
    std::io::stderr().flush().ok();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub fn build(cli: &Cli) -> Result<Startup> {
    let config = load_config(cli)?;
    let participant = cli.participant.as_str();
    check_participant(&config.behavioral_dir, participant)?;

    let main = TrialList::from_path(&config.conditions)?;
    let practice = config
        .practice_conditions
        .as_deref()
        .map(TrialList::from_path)
        .transpose()?;
    info!(
        experiment = %config.name,
        trials = main.len(),
        practice = practice.as_ref().map_or(0, TrialList::len),
        "conditions loaded"
    );

    let font = find_font(cli.font.as_deref())?;
    let metrics: Box<dyn TextMetrics> = match &font {
        Some(font) => Box::new(GlyphMetrics::new(font.clone())),
        None => {
            warn!("no font found, text is measured with monospace proportions and not drawn");
            Box::new(MonospaceMetrics::default())
        }
    };

    let session = RecordingSession::connect(
        &NoLiveBackend,
        config.tracker.clone(),
        cli.dummy,
        HighPrecisionTimer::new(),
        |err| cli.fallback_dummy || confirm_dummy(err),
    )?;

    let backdrop = PngBackdrop::new(config.screen, font.clone())?;
    let audio = SilentAudio {
        clip: Duration::from_millis(cli.clip_ms),
        warned: false,
    };
    let mut runner = TrialRunner::new(
        session,
        Paradigm::from_config(&config.paradigm, metrics),
        Box::new(audio),
        RunnerSettings::from_config(&config, participant),
    )
    .with_backdrop(Box::new(RenderedBackdrop(backdrop)));
    let version = runner.setup().context("setting up the tracker")?;
    debug!(version, "tracker configured");

    let log = BehavioralLog::create(&config.behavioral_dir, participant)?;
    info!(path = %log.path().display(), "behavioral log created");
    let runner = runner.with_log(log);

    let rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let experiment = ExperimentStateMachine::new(config, runner, main, practice, rng)?;
    Ok(Startup { experiment, font })
}

//! Trial runner: drives one trial at a time through drift check, recording,
//! presentation and finalisation against the recording session.

use std::path::PathBuf;
use std::time::Duration;

use gazex_core::{Rgba, Response, Scene, ScreenSize, TrialOutcome, TrialRecord, TrialState, Units};
use gazex_timing::Timer;
use gazex_tracker::{DriftOutcome, LinkStatus, Message, RecordingSession};
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::behavioral::{BehavioralLog, union_header};
use crate::conditions::{TrialList, TrialRow};
use crate::config::ExperimentConfig;
use crate::error::ExperimentError;
use crate::input::Input;
use crate::procedure::{AudioPlayer, Backdrop, Procedure, Stage, TrialContext, TrialPlan};

/// Per-participant settings the runner needs on every trial.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub participant: String,
    pub screen: ScreenSize,
    pub units: Units,
    pub background: Rgba,
    pub pilot_areas: bool,
    pub trial_vars: Option<Vec<String>>,
    /// Receives backdrops and the retrieved data file.
    pub participant_dir: PathBuf,
    pub data_file: PathBuf,
    pub inter_trial_interval: Duration,
}

impl RunnerSettings {
    pub fn from_config(config: &ExperimentConfig, participant: &str) -> Self {
        Self {
            participant: participant.to_string(),
            screen: config.screen,
            units: config.units,
            background: config.background,
            pilot_areas: config.pilot_areas,
            trial_vars: config.trial_vars.clone(),
            participant_dir: config.participant_dir(participant),
            data_file: config.data_file_path(participant),
            inter_trial_interval: Duration::from_millis(config.inter_trial_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerEvent {
    /// No trial in flight.
    Idle,
    /// A trial is in flight and waiting for the next tick or input.
    Waiting,
    TrialComplete(u32),
    TrialAbandoned(u32),
    Aborted,
}

struct ActiveTrial<Ts> {
    id: u32,
    block: String,
    row: TrialRow,
    plan: TrialPlan,
    clock: Ts,
}

pub struct TrialRunner<T: Timer, P: Procedure> {
    session: RecordingSession<T>,
    procedure: P,
    audio: Box<dyn AudioPlayer>,
    backdrop: Option<Box<dyn Backdrop>>,
    log: Option<BehavioralLog>,
    settings: RunnerSettings,
    state: TrialState,
    current: Option<ActiveTrial<T::Timestamp>>,
    scene: Scene,
    records: Vec<TrialRecord>,
    aborted: bool,
}

impl<T: Timer, P: Procedure> TrialRunner<T, P> {
    pub fn new(
        session: RecordingSession<T>,
        procedure: P,
        audio: Box<dyn AudioPlayer>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            scene: Scene::blank(settings.background),
            session,
            procedure,
            audio,
            backdrop: None,
            log: None,
            settings,
            state: TrialState::Idle,
            current: None,
            records: Vec::new(),
            aborted: false,
        }
    }

    pub fn with_backdrop(mut self, backdrop: Box<dyn Backdrop>) -> Self {
        self.backdrop = Some(backdrop);
        self
    }

    pub fn with_log(mut self, log: BehavioralLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Fixes the behavioral header to the columns of every block this runner
    /// will see, so a later block's columns are not lost to an earlier one.
    pub fn declare_columns(&mut self, blocks: &[&TrialList]) -> Result<(), ExperimentError> {
        let columns: Vec<String> = blocks.iter().flat_map(|list| list.columns()).collect();
        let header = union_header(columns.iter().map(String::as_str), self.procedure.response_columns())?;
        if let Some(log) = self.log.as_mut() {
            log.set_header(header)?;
        }
        Ok(())
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == TrialState::Idle
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn session(&self) -> &RecordingSession<T> {
        &self.session
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn current_trial(&self) -> Option<u32> {
        self.current.as_ref().map(|t| t.id)
    }

    /// Opens the device data file and sends the start-up configuration.
    pub fn setup(&mut self) -> Result<u32, ExperimentError> {
        let participant = self.settings.participant.clone();
        self.session.open_data_file(&participant)?;
        let major = self.session.configure(self.settings.screen)?;
        Ok(major)
    }

    pub fn calibrate(&mut self) {
        self.session.calibrate();
    }

    /// Starts the next trial from `row`.
    pub fn begin<R: Rng + ?Sized>(
        &mut self,
        row: &TrialRow,
        block: &str,
        rng: &mut R,
    ) -> Result<RunnerEvent, ExperimentError> {
        if self.aborted {
            return Ok(RunnerEvent::Aborted);
        }
        let ctx = TrialContext {
            trial_id: self.session.trial_count() + 1,
            participant: &self.settings.participant,
            screen: self.settings.screen,
            units: self.settings.units,
            background: self.settings.background,
            pilot_areas: self.settings.pilot_areas,
        };
        let plan = self.procedure.prepare(row, &ctx, rng)?;
        let id = self.session.begin_trial()?;
        info!(trial = id, block, row = row.index, "trial started");

        self.scene = Scene::blank(self.settings.background);
        self.current = Some(ActiveTrial {
            id,
            block: block.to_string(),
            row: row.clone(),
            plan,
            clock: self.session.timer().now(),
        });

        if self.session.is_dummy() {
            return self.enter_recording();
        }
        self.state = TrialState::DriftChecking;
        Ok(RunnerEvent::Waiting)
    }

    /// One tick of the event loop.
    pub fn update(&mut self) -> Result<RunnerEvent, ExperimentError> {
        match self.state {
            TrialState::Idle | TrialState::Finalizing => Ok(self.status()),
            TrialState::DriftChecking => self.drift_check(),
            TrialState::Recording => {
                if self.session.recording_lost() {
                    warn!(trial = ?self.current_trial(), "recording lost");
                    return self.abandon(Some("tracker_disconnected"));
                }
                match self.with_stage(|procedure, stage| procedure.poll(stage)) {
                    Some(Ok(Some(response))) => self.finalize(response),
                    Some(Err(err)) => Err(err),
                    _ => Ok(RunnerEvent::Waiting),
                }
            }
        }
    }

    pub fn handle_input(&mut self, input: &Input) -> Result<RunnerEvent, ExperimentError> {
        if *input == Input::Abort {
            self.abort(Some("experiment_aborted"));
            return Ok(RunnerEvent::Aborted);
        }
        if self.state != TrialState::Recording {
            return Ok(self.status());
        }
        if *input == Input::Escape {
            info!(trial = ?self.current_trial(), "trial skipped by operator");
            return self.abandon(Some("trial_skipped"));
        }
        match self.with_stage(|procedure, stage| procedure.input(input, stage)) {
            Some(Ok(Some(response))) => self.finalize(response),
            Some(Err(err)) => Err(err),
            _ => Ok(RunnerEvent::Waiting),
        }
    }

    fn status(&self) -> RunnerEvent {
        if self.aborted {
            RunnerEvent::Aborted
        } else if self.state == TrialState::Idle {
            RunnerEvent::Idle
        } else {
            RunnerEvent::Waiting
        }
    }

    fn with_stage<Out>(&mut self, f: impl FnOnce(&mut P, &mut Stage<'_, T>) -> Out) -> Option<Out> {
        let Self {
            session,
            procedure,
            audio,
            scene,
            current,
            ..
        } = self;
        let active = current.as_mut()?;
        let mut stage = Stage::new(session, &mut **audio, scene, &mut active.clock);
        Some(f(procedure, &mut stage))
    }

    fn drift_check(&mut self) -> Result<RunnerEvent, ExperimentError> {
        match self.session.check_link() {
            LinkStatus::Ok => {}
            status => {
                error!(?status, "tracker link failed during drift check");
                self.abort(None);
                return Ok(RunnerEvent::Aborted);
            }
        }
        let Some(target) = self.current.as_ref().map(|t| t.plan.drift_target) else {
            self.state = TrialState::Idle;
            return Ok(RunnerEvent::Idle);
        };
        match self.session.drift_check(target) {
            Ok(DriftOutcome::Accepted) => self.enter_recording(),
            Ok(DriftOutcome::Escaped) => {
                debug!("drift check escaped, repeating");
                Ok(RunnerEvent::Waiting)
            }
            Err(err) => {
                warn!(error = %err, "drift check failed, repeating");
                Ok(RunnerEvent::Waiting)
            }
        }
    }

    fn enter_recording(&mut self) -> Result<RunnerEvent, ExperimentError> {
        if let Err(err) = self.session.start_recording() {
            error!(trial = ?self.current_trial(), error = %err, "recording did not start");
            return self.abandon(None);
        }
        self.state = TrialState::Recording;
        match self.with_stage(|procedure, stage| procedure.onset(stage)) {
            Some(Err(err)) => Err(err),
            _ => Ok(RunnerEvent::Waiting),
        }
    }

    /// Ends the current trial with an error outcome, sending `marker` first.
    fn abandon(&mut self, marker: Option<&str>) -> Result<RunnerEvent, ExperimentError> {
        if let Some(marker) = marker {
            if let Err(err) = self.session.send_message(&Message::marker(marker)) {
                warn!(marker, error = %err, "marker not sent");
            }
        }
        self.session.abandon_trial()?;
        self.scene = Scene::blank(self.settings.background);
        self.state = TrialState::Idle;
        let Some(active) = self.current.take() else {
            return Ok(RunnerEvent::Idle);
        };
        let id = active.id;
        self.record_abandoned(active)?;
        Ok(RunnerEvent::TrialAbandoned(id))
    }

    fn record_abandoned(&mut self, active: ActiveTrial<T::Timestamp>) -> Result<(), ExperimentError> {
        let responses = self
            .procedure
            .response_columns()
            .iter()
            .map(|c| (c.to_string(), String::new()))
            .collect();
        self.record(TrialRecord {
            trial_id: active.id,
            block: active.block,
            outcome: TrialOutcome::Error,
            conditions: active.row.fields,
            responses,
        })
    }

    fn finalize(&mut self, response: Response) -> Result<RunnerEvent, ExperimentError> {
        self.state = TrialState::Finalizing;
        let Some(active) = self.current.take() else {
            self.state = TrialState::Idle;
            return Ok(RunnerEvent::Idle);
        };
        self.session.stop_recording()?;
        self.scene = Scene::blank(self.settings.background);

        for area in &active.plan.areas {
            self.session.send_message(&Message::InterestArea(area.clone()))?;
        }
        if active.plan.backdrop && !self.session.is_dummy() {
            self.send_backdrop(&active)?;
        }
        self.session.send_message(&Message::Clear(self.settings.background))?;

        let responses = self.procedure.response_values(&response);
        let vars: Vec<(String, String)> = self
            .condition_vars(&active.row)
            .into_iter()
            .chain(responses.iter().cloned())
            .collect();
        let pump_at = vars.len() / 2;
        for (i, (name, value)) in vars.iter().enumerate() {
            if i == pump_at && i > 0 {
                self.session.pump();
            }
            self.session.send_message(&Message::trial_var(name, value))?;
        }
        self.session.end_trial(TrialOutcome::Ok)?;

        let id = active.id;
        info!(trial = id, rt = %response.time, response = %response.identity, "trial complete");
        self.record(TrialRecord {
            trial_id: id,
            block: active.block,
            outcome: TrialOutcome::Ok,
            conditions: active.row.fields,
            responses,
        })?;

        if !self.settings.inter_trial_interval.is_zero() {
            self.session.timer().sleep(self.settings.inter_trial_interval);
        }
        self.state = TrialState::Idle;
        Ok(RunnerEvent::TrialComplete(id))
    }

    fn condition_vars(&self, row: &TrialRow) -> Vec<(String, String)> {
        match &self.settings.trial_vars {
            None => row.fields.clone(),
            Some(columns) => columns
                .iter()
                .filter_map(|c| match row.get(c) {
                    Some(value) => Some((c.clone(), value.to_string())),
                    None => {
                        warn!(column = %c, "trial variable not in condition file");
                        None
                    }
                })
                .collect(),
        }
    }

    fn send_backdrop(&mut self, active: &ActiveTrial<T::Timestamp>) -> Result<(), ExperimentError> {
        let Some(backdrop) = self.backdrop.as_mut() else {
            return Ok(());
        };
        let file = format!("{}_{}.png", active.id, self.settings.participant);
        let path = self.settings.participant_dir.join(&file);
        std::fs::create_dir_all(&self.settings.participant_dir)?;
        match backdrop.save(&active.plan.scene, &path) {
            Ok(()) => {
                self.session.send_message(&Message::ImageLoad(file))?;
            }
            Err(err) => warn!(path = %path.display(), error = %err, "backdrop not saved"),
        }
        Ok(())
    }

    fn record(&mut self, record: TrialRecord) -> Result<(), ExperimentError> {
        if let Some(log) = self.log.as_mut() {
            log.write(&record)?;
        }
        self.records.push(record);
        Ok(())
    }

    fn prepare_participant_dir(&self) {
        if let Err(err) = std::fs::create_dir_all(&self.settings.participant_dir) {
            warn!(
                dir = %self.settings.participant_dir.display(),
                error = %err,
                "results folder could not be created"
            );
        }
    }

    /// Terminal abort. Safe to call more than once.
    pub fn abort(&mut self, marker: Option<&str>) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        if let Some(marker) = marker {
            if !self.session.is_closed() {
                if let Err(err) = self.session.send_message(&Message::marker(marker)) {
                    warn!(marker, error = %err, "marker not sent");
                }
            }
        }
        if let Some(active) = self.current.take() {
            if let Err(err) = self.record_abandoned(active) {
                warn!(error = %err, "behavioral row for the aborted trial was not written");
            }
        }
        self.prepare_participant_dir();
        self.session.abort(&self.settings.data_file);
        self.state = TrialState::Idle;
        self.scene = Scene::blank(self.settings.background);
    }

    /// Normal end of the session: retrieve the data file and close the link.
    pub fn shutdown(&mut self) {
        if self.session.is_closed() {
            return;
        }
        self.prepare_participant_dir();
        self.session.shutdown(&self.settings.data_file);
    }
}

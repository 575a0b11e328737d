use gazex_core::{Phase, Scene, StandardPhase};
use gazex_timing::Timer;
use rand::Rng;
use tracing::{error, info};

use crate::conditions::TrialList;
use crate::config::ExperimentConfig;
use crate::error::ExperimentError;
use crate::input::Input;
use crate::procedure::Procedure;
use crate::runner::{RunnerEvent, TrialRunner};

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    PhaseChanged(StandardPhase),
    TrialComplete(u32),
    TrialAbandoned(u32),
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Completed,
    Aborted,
}

struct Block {
    name: &'static str,
    list: TrialList,
}

/// Walks the experiment through its phases and hands trial blocks to the
/// trial runner. Driven by `update` once per frame and `handle_input` for
/// every key press or click.
pub struct ExperimentStateMachine<T, P, R>
where
    T: Timer,
    P: Procedure,
    R: Rng,
{
    pub phase: StandardPhase,
    pub config: ExperimentConfig,
    runner: TrialRunner<T, P>,
    rng: R,
    practice: Option<TrialList>,
    main: Option<TrialList>,
    block: Option<Block>,
    /// Practice phase still shows its introduction screen.
    intro_pending: bool,
    status: Status,
    message: Scene,
}

impl<T, P, R> ExperimentStateMachine<T, P, R>
where
    T: Timer,
    P: Procedure,
    R: Rng,
{
    /// Fails when a condition column clashes with a behavioral log column.
    pub fn new(
        config: ExperimentConfig,
        mut runner: TrialRunner<T, P>,
        main: TrialList,
        practice: Option<TrialList>,
        rng: R,
    ) -> Result<Self, ExperimentError> {
        let blocks: Vec<&TrialList> = practice.iter().chain(std::iter::once(&main)).collect();
        runner.declare_columns(&blocks)?;
        let phase = StandardPhase::default();
        let message = Scene::message(
            &config.messages.welcome,
            config.message_size_px,
            config.foreground,
            config.background,
        );
        Ok(Self {
            phase,
            config,
            runner,
            rng,
            practice,
            main: Some(main),
            block: None,
            intro_pending: false,
            status: Status::Running,
            message,
        })
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn current_phase(&self) -> &StandardPhase {
        &self.phase
    }

    pub fn runner(&self) -> &TrialRunner<T, P> {
        &self.runner
    }

    /// What the display should show now.
    pub fn scene(&self) -> &Scene {
        if self.phase.runs_trials() && !self.intro_pending && self.status == Status::Running {
            self.runner.scene()
        } else {
            &self.message
        }
    }

    pub fn is_awaiting_input(&self) -> bool {
        self.status == Status::Running && (self.phase.is_message() || self.intro_pending)
    }

    /// Trials done and total in the running block.
    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        self.block
            .as_ref()
            .map(|b| (b.list.len() - b.list.remaining(), b.list.len()))
    }

    fn show_message(&mut self, text: &str) {
        self.message = Scene::message(
            text,
            self.config.message_size_px,
            self.config.foreground,
            self.config.background,
        );
    }

    fn message_for(&self, phase: StandardPhase) -> Option<String> {
        let messages = &self.config.messages;
        match phase {
            StandardPhase::Welcome => Some(messages.welcome.clone()),
            StandardPhase::TrackerInstructions => Some(messages.tracker_instructions.clone()),
            StandardPhase::Instructions => Some(messages.instructions.clone()),
            StandardPhase::Practice => Some(messages.practice.clone()),
            StandardPhase::Goodbye => Some(messages.goodbye.clone()),
            StandardPhase::Calibration | StandardPhase::Experiment => None,
        }
    }

    pub fn advance_phase(&mut self, events: &mut Vec<ExperimentEvent>) {
        let Some(next) = self.phase.next() else {
            self.complete(events);
            return;
        };
        self.phase = next;
        info!(phase = ?next, "phase started");
        events.push(ExperimentEvent::PhaseChanged(next));

        if let Some(text) = self.message_for(next) {
            self.show_message(&text);
        }
        match next {
            StandardPhase::Practice => match self.practice.take() {
                Some(list) => {
                    self.intro_pending = true;
                    self.block = Some(Block {
                        name: next.block().unwrap_or_default(),
                        list,
                    });
                }
                None => self.advance_phase(events),
            },
            StandardPhase::Experiment => {
                if let Some(list) = self.main.take() {
                    self.start_block(next.block().unwrap_or_default(), list);
                }
            }
            StandardPhase::Goodbye => self.runner.shutdown(),
            _ => {}
        }
    }

    fn start_block(&mut self, name: &'static str, mut list: TrialList) {
        list.shuffle(&mut self.rng);
        info!(block = name, trials = list.len(), "block started");
        self.block = Some(Block { name, list });
    }

    fn complete(&mut self, events: &mut Vec<ExperimentEvent>) {
        self.runner.shutdown();
        self.status = Status::Completed;
        info!("experiment complete");
        events.push(ExperimentEvent::Completed);
    }

    fn abort(&mut self, events: &mut Vec<ExperimentEvent>) {
        self.runner.abort(Some("experiment_aborted"));
        self.mark_aborted(events);
    }

    fn mark_aborted(&mut self, events: &mut Vec<ExperimentEvent>) {
        self.status = Status::Aborted;
        self.block = None;
        events.push(ExperimentEvent::Aborted);
    }

    fn fail(&mut self, err: ExperimentError, events: &mut Vec<ExperimentEvent>) {
        error!(error = %err, "experiment stopped");
        self.runner.abort(None);
        self.mark_aborted(events);
    }

    fn on_runner(&mut self, event: Result<RunnerEvent, ExperimentError>, events: &mut Vec<ExperimentEvent>) {
        match event {
            Ok(RunnerEvent::TrialComplete(id)) => events.push(ExperimentEvent::TrialComplete(id)),
            Ok(RunnerEvent::TrialAbandoned(id)) => events.push(ExperimentEvent::TrialAbandoned(id)),
            Ok(RunnerEvent::Aborted) => self.mark_aborted(events),
            Ok(RunnerEvent::Idle | RunnerEvent::Waiting) => {}
            Err(err) => self.fail(err, events),
        }
    }

    /// One frame tick.
    pub fn update(&mut self) -> Vec<ExperimentEvent> {
        let mut events = Vec::new();
        if self.status != Status::Running {
            return events;
        }
        match self.phase {
            phase if phase.requires_calibration() => {
                self.runner.calibrate();
                self.advance_phase(&mut events);
            }
            phase if phase.runs_trials() && !self.intro_pending => self.update_block(&mut events),
            _ => {}
        }
        events
    }

    fn update_block(&mut self, events: &mut Vec<ExperimentEvent>) {
        if !self.runner.is_idle() {
            let event = self.runner.update();
            self.on_runner(event, events);
            return;
        }
        let next = self
            .block
            .as_mut()
            .and_then(|b| b.list.next_row().cloned().map(|row| (b.name, row)));
        match next {
            Some((name, row)) => {
                let event = self.runner.begin(&row, name, &mut self.rng);
                self.on_runner(event, events);
            }
            None => {
                if let Some(block) = self.block.take() {
                    info!(block = block.name, "block complete");
                }
                self.advance_phase(events);
            }
        }
    }

    pub fn handle_input(&mut self, input: Input) -> Vec<ExperimentEvent> {
        let mut events = Vec::new();
        if self.status != Status::Running {
            return events;
        }
        if input == Input::Abort {
            self.abort(&mut events);
            return events;
        }
        match self.phase {
            phase if phase.is_message() => {
                if input == Input::Space {
                    self.advance_phase(&mut events);
                }
            }
            phase if phase.runs_trials() && self.intro_pending => {
                if input == Input::Space {
                    self.intro_pending = false;
                    if let Some(block) = self.block.take() {
                        self.start_block(block.name, block.list);
                    }
                }
            }
            phase if phase.runs_trials() => {
                let event = self.runner.handle_input(&input);
                self.on_runner(event, &mut events);
            }
            _ => {}
        }
        events
    }
}

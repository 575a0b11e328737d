//! Experiment flow on top of the tracker session: configuration, condition
//! files, paradigm procedures, the trial runner and the phase state machine.

pub mod behavioral;
pub mod conditions;
pub mod config;
pub mod error;
pub mod input;
pub mod procedure;
pub mod runner;
pub mod state;

pub use behavioral::BehavioralLog;
pub use conditions::{TrialList, TrialRow};
pub use config::{ExperimentConfig, ParadigmConfig, ReadingConfig, Task, VisualWorldConfig};
pub use error::ExperimentError;
pub use input::Input;
pub use procedure::{AudioPlayer, Backdrop, BackdropError, Paradigm, Procedure};
pub use runner::{RunnerEvent, RunnerSettings, TrialRunner};
pub use state::{ExperimentEvent, ExperimentStateMachine, Status};

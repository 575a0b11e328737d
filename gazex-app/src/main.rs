mod app;
mod setup;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use gazex_experiment::Status;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use app::App;

/// Eye-tracking experiment runner.
#[derive(Debug, Parser)]
#[command(name = "gazex", version)]
pub struct Cli {
    /// Participant number; also names the device data file.
    pub participant: String,

    /// Experiment configuration (JSON). Built-in defaults when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Condition file for the main block, overriding the configuration.
    #[arg(long)]
    pub conditions: Option<PathBuf>,

    /// Condition file for a practice block, overriding the configuration.
    #[arg(long)]
    pub practice: Option<PathBuf>,

    /// Run without tracker hardware.
    #[arg(long)]
    pub dummy: bool,

    /// Continue in dummy mode without asking when the tracker is unreachable.
    #[arg(long)]
    pub fallback_dummy: bool,

    #[arg(long)]
    pub tracker_address: Option<String>,

    /// TrueType font for text stimuli and messages.
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Seed for trial order; random when omitted.
    #[arg(long)]
    pub seed: Option<u64>,

    /// How long each audio clip is assumed to play, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub clip_ms: u64,

    #[arg(short, long)]
    pub verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<Status> {
    let startup = setup::build(cli)?;
    App::new(startup).run()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    info!(
        participant = %cli.participant,
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "starting"
    );

    match run(&cli) {
        Ok(Status::Completed) => ExitCode::SUCCESS,
        Ok(status) => {
            info!(?status, "experiment did not complete");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

use std::fmt::Debug;

/// Stages a session moves through, in order.
pub trait Phase: Copy + PartialEq + Send + Sync + Debug + Default {
    fn next(&self) -> Option<Self>;
    fn requires_calibration(&self) -> bool;

    /// Phase shows a text screen and waits for the participant to continue.
    fn is_message(&self) -> bool {
        false
    }

    /// Name of the trial block this phase runs, as written to the
    /// behavioral log.
    fn block(&self) -> Option<&'static str> {
        None
    }

    fn runs_trials(&self) -> bool {
        self.block().is_some()
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum StandardPhase {
    #[default]
    Welcome,
    TrackerInstructions,
    Calibration,
    Instructions,
    Practice,
    Experiment,
    Goodbye,
}

impl Phase for StandardPhase {
    fn next(&self) -> Option<Self> {
        use StandardPhase::*;
        Some(match self {
            Welcome => TrackerInstructions,
            TrackerInstructions => Calibration,
            Calibration => Instructions,
            Instructions => Practice,
            Practice => Experiment,
            Experiment => Goodbye,
            Goodbye => return None,
        })
    }

    fn requires_calibration(&self) -> bool {
        matches!(self, Self::Calibration)
    }

    fn is_message(&self) -> bool {
        matches!(
            self,
            Self::Welcome | Self::TrackerInstructions | Self::Instructions | Self::Goodbye
        )
    }

    fn block(&self) -> Option<&'static str> {
        match self {
            Self::Practice => Some("practice"),
            Self::Experiment => Some("experiment"),
            _ => None,
        }
    }
}

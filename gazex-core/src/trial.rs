use std::fmt;
use std::time::Duration;

/// Handshake state of the trial in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrialState {
    #[default]
    Idle,
    DriftChecking,
    Recording,
    Finalizing,
}

/// Result code closing a trial segment in the device log (`TRIAL_RESULT <code>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Ok,
    Error,
}

impl TrialOutcome {
    pub fn code(self) -> i32 {
        match self {
            TrialOutcome::Ok => 0,
            TrialOutcome::Error => -1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TrialOutcome::Ok => "ok",
            TrialOutcome::Error => "error",
        }
    }
}

/// Response latency as logged, never a number when the deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTime {
    Millis(u64),
    Timeout,
    NotApplicable,
}

impl ResponseTime {
    pub const TIMEOUT: &'static str = "timeout";

    /// Rounds to the nearest millisecond.
    pub fn from_elapsed(elapsed: Duration) -> Self {
        ResponseTime::Millis((elapsed.as_secs_f64() * 1000.0).round() as u64)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ResponseTime::Timeout)
    }
}

impl fmt::Display for ResponseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseTime::Millis(ms) => write!(f, "{ms}"),
            ResponseTime::Timeout => f.write_str(Self::TIMEOUT),
            ResponseTime::NotApplicable => f.write_str("NA"),
        }
    }
}

/// What ended the presentation phase of a trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub time: ResponseTime,
    /// Key name, clicked object label, `none` or `timeout`.
    pub identity: String,
}

impl Response {
    pub fn new(time: ResponseTime, identity: impl Into<String>) -> Self {
        Self {
            time,
            identity: identity.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(ResponseTime::Timeout, ResponseTime::TIMEOUT)
    }
}

/// One behavioral row: condition fields plus what the trial produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub trial_id: u32,
    pub block: String,
    pub outcome: TrialOutcome,
    pub conditions: Vec<(String, String)>,
    pub responses: Vec<(String, String)>,
}

impl TrialRecord {
    pub fn response(&self, name: &str) -> Option<&str> {
        self.responses
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

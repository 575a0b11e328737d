//! In-memory tracker whose behaviour is set by a shared script, for
//! exercising the trial protocol without hardware.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::TrackerError;
use crate::protocol::{DriftOutcome, RecordingFlags};
use crate::tracker::Tracker;

/// One call made against the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Command(String),
    Message(String),
    OpenDataFile(String),
    CloseDataFile,
    ReceiveDataFile { remote: String, local: PathBuf },
    SetOffline,
    TrackerSetup,
    ExitCalibration,
    DriftCorrect { x: i32, y: i32 },
    StartRecording(RecordingFlags),
    StopRecording,
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Command(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.0.lock() {
            calls.clear();
        }
    }
}

#[derive(Debug)]
struct Script {
    connected: bool,
    break_pressed: bool,
    recording: bool,
    drop_recording: bool,
    drift: VecDeque<Result<DriftOutcome, String>>,
    fail_start_recording: bool,
    fail_open: bool,
    fail_receive: bool,
    fail_setup: bool,
    version: String,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connected: true,
            break_pressed: false,
            recording: false,
            drop_recording: false,
            drift: VecDeque::new(),
            fail_start_recording: false,
            fail_open: false,
            fail_receive: false,
            fail_setup: false,
            version: "EYELINK CL 5.12".to_string(),
        }
    }
}

/// Handle for changing a [`ScriptedTracker`]'s behaviour while it runs.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle(Arc<Mutex<Script>>);

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, Script> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queues drift check results; an empty queue accepts.
    pub fn drift_results(&self, results: impl IntoIterator<Item = Result<DriftOutcome, String>>) {
        self.lock().drift.extend(results);
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    pub fn press_break(&self) {
        self.lock().break_pressed = true;
    }

    /// Makes `is_recording` report false from now on.
    pub fn drop_recording(&self) {
        self.lock().drop_recording = true;
    }

    pub fn fail_start_recording(&self, fail: bool) {
        self.lock().fail_start_recording = fail;
    }

    pub fn fail_open(&self) {
        self.lock().fail_open = true;
    }

    pub fn fail_receive(&self) {
        self.lock().fail_receive = true;
    }

    pub fn fail_setup(&self) {
        self.lock().fail_setup = true;
    }

    pub fn set_version(&self, version: &str) {
        self.lock().version = version.to_string();
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedTracker {
    log: CallLog,
    script: ScriptHandle,
}

impl ScriptedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn script(&self) -> ScriptHandle {
        self.script.clone()
    }

    fn require_link(&self) -> Result<(), TrackerError> {
        if self.script.lock().connected {
            Ok(())
        } else {
            Err(TrackerError::NotConnected)
        }
    }
}

impl Tracker for ScriptedTracker {
    fn is_connected(&self) -> bool {
        self.script.lock().connected
    }

    fn break_pressed(&mut self) -> bool {
        self.script.lock().break_pressed
    }

    fn send_command(&mut self, command: &str) -> Result<(), TrackerError> {
        self.require_link()?;
        self.log.push(Call::Command(command.to_string()));
        Ok(())
    }

    fn send_message(&mut self, message: &str) -> Result<(), TrackerError> {
        self.require_link()?;
        self.log.push(Call::Message(message.to_string()));
        Ok(())
    }

    fn version_string(&mut self) -> Result<String, TrackerError> {
        self.require_link()?;
        Ok(self.script.lock().version.clone())
    }

    fn open_data_file(&mut self, name: &str) -> Result<(), TrackerError> {
        self.log.push(Call::OpenDataFile(name.to_string()));
        if self.script.lock().fail_open {
            return Err(TrackerError::OpenDataFile {
                name: name.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn close_data_file(&mut self) -> Result<(), TrackerError> {
        self.log.push(Call::CloseDataFile);
        Ok(())
    }

    fn receive_data_file(&mut self, remote: &str, local: &Path) -> Result<(), TrackerError> {
        self.log.push(Call::ReceiveDataFile {
            remote: remote.to_string(),
            local: local.to_path_buf(),
        });
        if self.script.lock().fail_receive {
            return Err(TrackerError::Transfer {
                remote: remote.to_string(),
                local: local.to_path_buf(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn set_offline_mode(&mut self) -> Result<(), TrackerError> {
        self.log.push(Call::SetOffline);
        self.script.lock().recording = false;
        Ok(())
    }

    fn do_tracker_setup(&mut self) -> Result<(), TrackerError> {
        self.log.push(Call::TrackerSetup);
        if self.script.lock().fail_setup {
            return Err(TrackerError::Setup {
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn exit_calibration(&mut self) {
        self.log.push(Call::ExitCalibration);
    }

    fn do_drift_correct(&mut self, x: i32, y: i32) -> Result<DriftOutcome, TrackerError> {
        self.log.push(Call::DriftCorrect { x, y });
        match self.script.lock().drift.pop_front() {
            None => Ok(DriftOutcome::Accepted),
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(reason)) => Err(TrackerError::DriftCheck { reason }),
        }
    }

    fn start_recording(&mut self, flags: RecordingFlags) -> Result<(), TrackerError> {
        self.log.push(Call::StartRecording(flags));
        let mut script = self.script.lock();
        if script.fail_start_recording {
            return Err(TrackerError::StartRecording {
                reason: "scripted failure".to_string(),
            });
        }
        script.recording = true;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), TrackerError> {
        self.log.push(Call::StopRecording);
        self.script.lock().recording = false;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        let script = self.script.lock();
        script.recording && !script.drop_recording
    }

    fn close(&mut self) -> Result<(), TrackerError> {
        self.log.push(Call::Close);
        let mut script = self.script.lock();
        script.connected = false;
        script.recording = false;
        Ok(())
    }
}

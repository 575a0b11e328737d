//! The recording session owns the tracker link for a whole experiment.
//!
//! It holds the trial counter and the open-segment flag, so the trial
//! handshake can be driven one step at a time by whoever owns the session
//! while the session keeps the device-side invariants: ids grow by one,
//! recordings never overlap, and the link is closed exactly once.

use std::path::Path;
use std::time::Duration;

use gazex_core::{DevicePoint, ScreenSize, TrialOutcome};
use gazex_timing::Timer;
use tracing::{debug, info, warn};

use crate::dummy::DummyTracker;
use crate::error::TrackerError;
use crate::protocol::{Command, DataFilters, DriftOutcome, Message, parse_major_version};
use crate::settings::TrackerSettings;
use crate::tracker::{Connector, Tracker};

const SETTLE_DELAY: Duration = Duration::from_millis(100);
const ABORT_DELAY: Duration = Duration::from_millis(500);
/// Wait between closing the data file and asking for it.
const FLUSH_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerMode {
    Live,
    Dummy,
}

/// Health of the link as seen between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Ok,
    Lost,
    /// Operator pressed the break key on the host PC.
    Break,
}

pub struct RecordingSession<T: Timer> {
    tracker: Box<dyn Tracker>,
    timer: T,
    mode: TrackerMode,
    settings: TrackerSettings,
    data_file: Option<String>,
    trial_counter: u32,
    segment_open: bool,
    recording: bool,
    closed: bool,
}

impl<T: Timer> std::fmt::Debug for RecordingSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("mode", &self.mode)
            .field("data_file", &self.data_file)
            .field("trial_counter", &self.trial_counter)
            .field("segment_open", &self.segment_open)
            .field("recording", &self.recording)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<T: Timer> RecordingSession<T> {
    pub fn new(tracker: Box<dyn Tracker>, mode: TrackerMode, settings: TrackerSettings, timer: T) -> Self {
        Self {
            tracker,
            timer,
            mode,
            settings,
            data_file: None,
            trial_counter: 0,
            segment_open: false,
            recording: false,
            closed: false,
        }
    }

    /// Connects through `connector`, or builds a dummy session when `dummy`
    /// is set. A failed live connection falls back to dummy mode only if
    /// `confirm_fallback` agrees.
    pub fn connect<C, F>(
        connector: &C,
        settings: TrackerSettings,
        dummy: bool,
        timer: T,
        confirm_fallback: F,
    ) -> Result<Self, TrackerError>
    where
        C: Connector + ?Sized,
        F: FnOnce(&TrackerError) -> bool,
    {
        if dummy {
            info!("tracker running in dummy mode");
            return Ok(Self::new(Box::new(DummyTracker::new()), TrackerMode::Dummy, settings, timer));
        }
        match connector.connect(&settings.address) {
            Ok(tracker) => {
                info!(address = %settings.address, "tracker connected");
                Ok(Self::new(tracker, TrackerMode::Live, settings, timer))
            }
            Err(err) => {
                warn!(error = %err, "tracker connection failed");
                if confirm_fallback(&err) {
                    info!("continuing in dummy mode");
                    Ok(Self::new(Box::new(DummyTracker::new()), TrackerMode::Dummy, settings, timer))
                } else {
                    Err(TrackerError::FallbackDeclined { source: Box::new(err) })
                }
            }
        }
    }

    pub fn mode(&self) -> TrackerMode {
        self.mode
    }

    pub fn is_dummy(&self) -> bool {
        self.mode == TrackerMode::Dummy
    }

    /// Trials begun so far; also the id of the latest trial.
    pub fn trial_count(&self) -> u32 {
        self.trial_counter
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn segment_open(&self) -> bool {
        self.segment_open
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn data_file(&self) -> Option<&str> {
        self.data_file.as_deref()
    }

    fn ensure_open(&self) -> Result<(), TrackerError> {
        if self.closed {
            Err(TrackerError::Closed)
        } else {
            Ok(())
        }
    }

    /// Opens `<participant>.EDF` on the host. Dummy sessions keep no file.
    /// On failure the link is closed and the session is finished.
    pub fn open_data_file(&mut self, participant: &str) -> Result<(), TrackerError> {
        self.ensure_open()?;
        if self.is_dummy() {
            return Ok(());
        }
        let name = format!("{participant}.EDF");
        match self.tracker.open_data_file(&name) {
            Ok(()) => {
                info!(file = %name, "data file opened");
                self.data_file = Some(name);
                Ok(())
            }
            Err(err) => {
                self.close_link();
                Err(err)
            }
        }
    }

    /// Sends the start-up configuration and returns the tracker's major
    /// version (0 in dummy mode).
    pub fn configure(&mut self, screen: ScreenSize) -> Result<u32, TrackerError> {
        self.ensure_open()?;
        let preamble = Command::AddFilePreambleText(self.settings.preamble.clone());
        self.send_command(&preamble)?;
        if self.is_dummy() {
            return Ok(0);
        }

        self.tracker.set_offline_mode()?;
        self.timer.sleep(SETTLE_DELAY);
        for command in [
            Command::SampleRate(self.settings.sample_rate),
            Command::RecordingParseGaze,
            Command::SelectParserConfiguration(0),
            Command::CalibrationType(self.settings.calibration_type),
            Command::ScreenPixelCoords(screen),
        ] {
            self.send_command(&command)?;
        }
        self.send_message(&Message::DisplayCoords(screen))?;

        let version = self.tracker.version_string()?;
        let major = parse_major_version(&version)?;
        info!(%version, major, "tracker configured");
        for command in DataFilters::for_version(major).commands() {
            self.send_command(&command)?;
        }
        Ok(major)
    }

    /// Runs camera setup on the host. Errors are logged and calibration is
    /// exited so the experiment can go on.
    pub fn calibrate(&mut self) {
        if self.closed || self.is_dummy() {
            debug!("calibration skipped");
            return;
        }
        if let Err(err) = self.tracker.do_tracker_setup() {
            warn!(error = %err, "tracker setup failed");
            self.tracker.exit_calibration();
        }
    }

    /// Opens a new trial segment and returns its id.
    pub fn begin_trial(&mut self) -> Result<u32, TrackerError> {
        self.ensure_open()?;
        self.trial_counter += 1;
        let id = self.trial_counter;
        self.segment_open = true;
        self.send_message(&Message::TrialId(id))?;
        self.send_command(&Command::RecordStatusMessage(format!("TRIAL number {id}")))?;
        debug!(trial = id, "trial segment opened");
        Ok(id)
    }

    pub fn check_link(&mut self) -> LinkStatus {
        if self.closed || !self.tracker.is_connected() {
            LinkStatus::Lost
        } else if self.tracker.break_pressed() {
            LinkStatus::Break
        } else {
            LinkStatus::Ok
        }
    }

    /// One drift check attempt at a device pixel.
    pub fn drift_check(&mut self, target: DevicePoint) -> Result<DriftOutcome, TrackerError> {
        self.ensure_open()?;
        self.tracker.do_drift_correct(target.x as i32, target.y as i32)
    }

    pub fn start_recording(&mut self) -> Result<(), TrackerError> {
        self.ensure_open()?;
        if self.recording {
            return Err(TrackerError::AlreadyRecording);
        }
        self.tracker.set_offline_mode()?;
        self.tracker.start_recording(self.settings.recording)?;
        self.recording = true;
        debug!(trial = self.trial_counter, "recording started");
        Ok(())
    }

    /// Recording dropped on a live tracker without being stopped.
    pub fn recording_lost(&self) -> bool {
        self.mode == TrackerMode::Live && self.recording && !self.tracker.is_recording()
    }

    /// Waits the grace delay, then stops recording. Does nothing when no
    /// recording is active.
    pub fn stop_recording(&mut self) -> Result<(), TrackerError> {
        if !self.recording || self.closed {
            return Ok(());
        }
        self.timer.sleep(self.settings.grace_delay());
        self.recording = false;
        self.tracker.stop_recording()?;
        debug!(trial = self.trial_counter, "recording stopped");
        Ok(())
    }

    pub fn send_message(&mut self, message: &Message) -> Result<(), TrackerError> {
        self.ensure_open()?;
        let text = message.to_string();
        debug!(message = %text, "tracker message");
        self.tracker.send_message(&text)
    }

    pub fn send_command(&mut self, command: &Command) -> Result<(), TrackerError> {
        self.ensure_open()?;
        let text = command.to_string();
        debug!(command = %text, "tracker command");
        self.tracker.send_command(&text)
    }

    /// Pause so the host can drain a burst of messages.
    pub fn pump(&self) {
        self.timer.sleep(self.settings.message_pump());
    }

    /// Closes the open segment with `TRIAL_RESULT`.
    pub fn end_trial(&mut self, outcome: TrialOutcome) -> Result<(), TrackerError> {
        self.ensure_open()?;
        self.segment_open = false;
        self.send_message(&Message::TrialResult(outcome))?;
        info!(trial = self.trial_counter, outcome = outcome.label(), "trial ended");
        Ok(())
    }

    /// Stops any active recording and closes an open segment with an error
    /// result. Safe to call repeatedly.
    pub fn abandon_trial(&mut self) -> Result<(), TrackerError> {
        if self.closed {
            return Ok(());
        }
        self.stop_recording()?;
        if self.segment_open {
            self.end_trial(TrialOutcome::Error)?;
        }
        Ok(())
    }

    /// Normal end of the experiment: close the data file, copy it to
    /// `local`, close the link.
    pub fn shutdown(&mut self, local: &Path) {
        if self.closed {
            return;
        }
        if let Err(err) = self.abandon_trial() {
            warn!(error = %err, "could not close the last trial");
        }
        if let Err(err) = self.tracker.set_offline_mode() {
            warn!(error = %err, "could not set tracker offline");
        }
        self.timer.sleep(SETTLE_DELAY);
        self.retrieve(local, FLUSH_DELAY);
        self.close_link();
    }

    /// Terminal abort from any state. A second call does nothing.
    pub fn abort(&mut self, local: &Path) {
        if self.closed {
            return;
        }
        warn!(trial = self.trial_counter, "aborting experiment");
        if self.tracker.is_connected() {
            if let Err(err) = self.abandon_trial() {
                warn!(error = %err, "could not abandon the current trial");
            }
            if let Err(err) = self.tracker.set_offline_mode() {
                warn!(error = %err, "could not set tracker offline");
            }
            if let Err(err) = self.send_command(&Command::ClearScreen(0)) {
                warn!(error = %err, "could not clear the host screen");
            }
            self.timer.sleep(ABORT_DELAY);
            self.retrieve(local, Duration::ZERO);
        }
        self.close_link();
    }

    fn retrieve(&mut self, local: &Path, flush: Duration) {
        let Some(name) = self.data_file.clone() else {
            return;
        };
        if let Err(err) = self.tracker.close_data_file() {
            warn!(error = %err, "could not close the data file");
        }
        if !flush.is_zero() {
            self.timer.sleep(flush);
        }
        match self.tracker.receive_data_file(&name, local) {
            Ok(()) => info!(file = %name, local = %local.display(), "data file retrieved"),
            Err(err) => warn!(error = %err, "data file was not retrieved"),
        }
    }

    fn close_link(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.recording = false;
        self.segment_open = false;
        if let Err(err) = self.tracker.close() {
            warn!(error = %err, "tracker close failed");
        }
        info!("tracker link closed");
    }
}

impl<T: Timer> Drop for RecordingSession<T> {
    fn drop(&mut self) {
        if !self.closed {
            warn!("recording session dropped with the link open");
            self.close_link();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use assert_matches::assert_matches;
    use gazex_timing::ManualTimer;

    use super::*;
    use crate::scripted::{Call, ScriptedTracker};
    use crate::tracker::NoLiveBackend;

    fn live() -> (RecordingSession<ManualTimer>, ScriptedTracker, ManualTimer) {
        let tracker = ScriptedTracker::new();
        let timer = ManualTimer::new();
        let session = RecordingSession::new(
            Box::new(tracker.clone()),
            TrackerMode::Live,
            TrackerSettings::default(),
            timer.clone(),
        );
        (session, tracker, timer)
    }

    #[test]
    fn trial_ids_increase_by_one() {
        let (mut session, tracker, _) = live();
        for _ in 0..3 {
            session.begin_trial().unwrap();
            session.end_trial(TrialOutcome::Ok).unwrap();
        }
        let ids: Vec<_> = tracker
            .log()
            .messages()
            .into_iter()
            .filter(|m| m.starts_with("TRIALID"))
            .collect();
        assert_eq!(ids, ["TRIALID 1", "TRIALID 2", "TRIALID 3"]);
        assert!(
            tracker
                .log()
                .commands()
                .contains(&"record_status_message 'TRIAL number 2'".to_string())
        );
    }

    #[test]
    fn abandon_is_idempotent() {
        let (mut session, tracker, timer) = live();
        session.begin_trial().unwrap();
        session.start_recording().unwrap();
        session.abandon_trial().unwrap();
        let after_first = tracker.log().calls();
        session.abandon_trial().unwrap();
        assert_eq!(tracker.log().calls(), after_first);
        assert_eq!(tracker.log().count(&Call::Message("TRIAL_RESULT -1".into())), 1);
        assert_eq!(tracker.log().count(&Call::StopRecording), 1);
        assert_eq!(timer.sleeps(), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn abandon_without_segment_touches_nothing() {
        let (mut session, tracker, _) = live();
        session.abandon_trial().unwrap();
        assert!(tracker.log().calls().is_empty());
    }

    #[test]
    fn second_recording_is_refused() {
        let (mut session, _, _) = live();
        session.start_recording().unwrap();
        assert_matches!(session.start_recording(), Err(TrackerError::AlreadyRecording));
    }

    #[test]
    fn lost_recording_is_reported_only_in_live_mode() {
        let (mut session, tracker, _) = live();
        session.start_recording().unwrap();
        assert!(!session.recording_lost());
        tracker.script().drop_recording();
        assert!(session.recording_lost());
    }

    #[test]
    fn abort_closes_once_and_swallows_transfer_failure() {
        let (mut session, tracker, timer) = live();
        tracker.script().fail_receive();
        session.open_data_file("12").unwrap();
        session.begin_trial().unwrap();
        session.start_recording().unwrap();

        let local = PathBuf::from("results/pp_12/12.EDF");
        session.abort(&local);
        session.abort(&local);
        session.shutdown(&local);

        let log = tracker.log();
        assert_eq!(log.count(&Call::Close), 1);
        assert_eq!(log.count(&Call::Message("TRIAL_RESULT -1".into())), 1);
        assert!(log.commands().contains(&"clear_screen 0".to_string()));
        assert_eq!(
            log.count(&Call::ReceiveDataFile {
                remote: "12.EDF".into(),
                local: local.clone()
            }),
            1
        );
        assert!(timer.sleeps().contains(&ABORT_DELAY));
        assert!(session.is_closed());
        assert_matches!(session.begin_trial(), Err(TrackerError::Closed));
    }

    #[test]
    fn shutdown_waits_for_the_data_file_to_flush() {
        let (mut session, tracker, timer) = live();
        session.open_data_file("7").unwrap();
        let local = PathBuf::from("results/pp_7/7.EDF");
        session.shutdown(&local);
        session.shutdown(&local);

        assert!(timer.sleeps().ends_with(&[SETTLE_DELAY, FLUSH_DELAY]));
        let calls = tracker.log().calls();
        let offline = calls.iter().rposition(|c| *c == Call::SetOffline).unwrap();
        let closed = calls.iter().position(|c| *c == Call::CloseDataFile).unwrap();
        let received = calls
            .iter()
            .position(|c| matches!(c, Call::ReceiveDataFile { .. }))
            .unwrap();
        assert!(offline < closed && closed < received);
        assert_eq!(tracker.log().count(&Call::Close), 1);
    }

    #[test]
    fn failed_data_file_closes_the_link() {
        let (mut session, tracker, _) = live();
        tracker.script().fail_open();
        assert_matches!(session.open_data_file("3"), Err(TrackerError::OpenDataFile { .. }));
        assert!(session.is_closed());
        assert_eq!(tracker.log().count(&Call::Close), 1);
    }

    #[test]
    fn live_configuration_sends_filters_for_version() {
        let (mut session, tracker, _) = live();
        tracker.script().set_version("EYELINK II 2.0");
        let major = session.configure(ScreenSize::new(1024, 768)).unwrap();
        assert_eq!(major, 2);
        let commands = tracker.log().commands();
        assert_eq!(commands[1], "sample_rate 1000");
        assert!(commands.contains(&"screen_pixel_coords = 0 0 1023 767".to_string()));
        assert!(commands.iter().all(|c| !c.contains("HTARGET")));
        assert_eq!(tracker.log().messages(), ["DISPLAY_COORDS 0 0 1023 767"]);
    }

    #[test]
    fn declined_fallback_is_an_error() {
        let result = RecordingSession::connect(
            &NoLiveBackend,
            TrackerSettings::default(),
            false,
            ManualTimer::new(),
            |_| false,
        );
        assert_matches!(result, Err(TrackerError::FallbackDeclined { .. }));

        let session = RecordingSession::connect(
            &NoLiveBackend,
            TrackerSettings::default(),
            false,
            ManualTimer::new(),
            |_| true,
        )
        .unwrap();
        assert!(session.is_dummy());
    }

    #[test]
    fn dummy_session_skips_live_setup() {
        let mut session =
            RecordingSession::connect(&NoLiveBackend, TrackerSettings::default(), true, ManualTimer::new(), |_| {
                unreachable!()
            })
            .unwrap();
        assert_eq!(session.configure(ScreenSize::new(800, 600)).unwrap(), 0);
        session.open_data_file("1").unwrap();
        assert_eq!(session.data_file(), None);
        session.start_recording().unwrap();
        assert!(!session.recording_lost());
    }
}

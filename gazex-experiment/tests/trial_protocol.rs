use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gazex_core::{MonospaceMetrics, Point, Scene, StandardPhase, TrialState};
use gazex_experiment::procedure::BackdropError;
use gazex_experiment::{
    AudioPlayer, Backdrop, BehavioralLog, ExperimentConfig, ExperimentError, ExperimentEvent, ExperimentStateMachine,
    Input,
    Paradigm, ParadigmConfig, ReadingConfig, RunnerSettings, Status, TrialList, TrialRow, TrialRunner,
    VisualWorldConfig,
};
use gazex_timing::ManualTimer;
use gazex_tracker::{Call, DriftOutcome, RecordingSession, ScriptedTracker, TrackerMode};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

struct Clip(Duration);

impl AudioPlayer for Clip {
    fn play(&mut self, _clip: &Path) -> Duration {
        self.0
    }
}

#[derive(Clone, Default)]
struct SavedBackdrops(Arc<Mutex<Vec<PathBuf>>>);

impl Backdrop for SavedBackdrops {
    fn save(&mut self, _scene: &Scene, path: &Path) -> Result<(), BackdropError> {
        self.0.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

struct Harness {
    machine: ExperimentStateMachine<ManualTimer, Paradigm, StdRng>,
    tracker: ScriptedTracker,
    timer: ManualTimer,
    config: ExperimentConfig,
    backdrops: SavedBackdrops,
    _dir: TempDir,
}

fn sentences(n: usize) -> Vec<TrialRow> {
    (0..n)
        .map(|i| {
            TrialRow::new(
                i,
                vec![
                    ("sentence".into(), format!("Sentence number {i} ends.")),
                    ("nr_ch_IA1".into(), "9".into()),
                    ("nr_ch_IA2".into(), "7".into()),
                    ("nr_ch_IA3".into(), "9".into()),
                    ("frequency".into(), if i % 2 == 0 { "high" } else { "low" }.into()),
                ],
            )
        })
        .collect()
}

fn pictures(n: usize) -> Vec<TrialRow> {
    (0..n)
        .map(|i| {
            let mut fields = vec![("trialtype".to_string(), format!("t{i}"))];
            for (j, name) in ["candle", "candy", "sandal", "pickle"].iter().enumerate() {
                fields.push((format!("image_{}_ID", j + 1), name.to_string()));
                fields.push((format!("image_{}_label", j + 1), name.to_string()));
            }
            fields.push(("audio1".into(), "click_on".into()));
            fields.push(("audio2".into(), "candle".into()));
            TrialRow::new(i, fields)
        })
        .collect()
}

fn config_in(dir: &TempDir, paradigm: ParadigmConfig) -> ExperimentConfig {
    ExperimentConfig {
        results_dir: dir.path().join("results"),
        behavioral_dir: dir.path().join("behavioral"),
        paradigm,
        ..Default::default()
    }
}

fn runner_for(
    config: &ExperimentConfig,
    mode: TrackerMode,
) -> (TrialRunner<ManualTimer, Paradigm>, ScriptedTracker, ManualTimer, SavedBackdrops) {
    let tracker = ScriptedTracker::new();
    let timer = ManualTimer::new();
    let session = RecordingSession::new(
        Box::new(tracker.clone()),
        mode,
        config.tracker.clone(),
        timer.clone(),
    );
    let procedure = Paradigm::from_config(&config.paradigm, Box::new(MonospaceMetrics::default()));
    let backdrops = SavedBackdrops::default();
    let mut runner = TrialRunner::new(
        session,
        procedure,
        Box::new(Clip(Duration::from_millis(300))),
        RunnerSettings::from_config(config, "1"),
    )
    .with_backdrop(Box::new(backdrops.clone()))
    .with_log(BehavioralLog::create(&config.behavioral_dir, "1").unwrap());
    runner.setup().unwrap();
    (runner, tracker, timer, backdrops)
}

fn harness(
    paradigm: ParadigmConfig,
    rows: Vec<TrialRow>,
    mode: TrackerMode,
    tweak: impl FnOnce(&mut ExperimentConfig),
) -> Harness {
    harness_with_practice(paradigm, rows, None, mode, tweak)
}

fn harness_with_practice(
    paradigm: ParadigmConfig,
    rows: Vec<TrialRow>,
    practice: Option<Vec<TrialRow>>,
    mode: TrackerMode,
    tweak: impl FnOnce(&mut ExperimentConfig),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir, paradigm);
    tweak(&mut config);
    let (runner, tracker, timer, backdrops) = runner_for(&config, mode);

    let machine = ExperimentStateMachine::new(
        config.clone(),
        runner,
        TrialList::new(rows),
        practice.map(TrialList::new),
        StdRng::seed_from_u64(11),
    )
    .unwrap();
    Harness {
        machine,
        tracker,
        timer,
        config,
        backdrops,
        _dir: dir,
    }
}

fn reading(rows: usize) -> Harness {
    reading_with(
        rows,
        ReadingConfig {
            backdrops: false,
            ..Default::default()
        },
    )
}

fn reading_with(rows: usize, reading: ReadingConfig) -> Harness {
    harness(
        ParadigmConfig::Reading(reading),
        sentences(rows),
        TrackerMode::Live,
        |_| {},
    )
}

/// Welcome, tracker instructions, calibration, instructions.
fn enter_experiment(h: &mut Harness) {
    h.machine.handle_input(Input::Space);
    h.machine.handle_input(Input::Space);
    h.machine.update();
    h.machine.handle_input(Input::Space);
    assert_eq!(h.machine.phase, StandardPhase::Experiment);
}

/// Begin, pass the drift check, start recording.
fn start_trial(h: &mut Harness) {
    h.machine.update();
    h.machine.update();
    assert_eq!(h.machine.runner().state(), TrialState::Recording);
}

fn messages_from_trial(h: &Harness, id: u32) -> Vec<String> {
    let messages = h.tracker.log().messages();
    let start = messages
        .iter()
        .position(|m| *m == format!("TRIALID {id}"))
        .unwrap();
    messages[start..].to_vec()
}

#[test]
fn full_run_numbers_trials_consecutively() {
    let mut h = reading(5);
    enter_experiment(&mut h);
    for _ in 0..5 {
        start_trial(&mut h);
        h.timer.advance(Duration::from_millis(420));
        let events = h.machine.handle_input(Input::Space);
        assert!(matches!(events.as_slice(), [ExperimentEvent::TrialComplete(_)]));
    }
    let events = h.machine.update();
    assert!(events.contains(&ExperimentEvent::PhaseChanged(StandardPhase::Goodbye)));
    let events = h.machine.handle_input(Input::Space);
    assert_eq!(events, [ExperimentEvent::Completed]);
    assert_eq!(h.machine.status(), Status::Completed);

    let log = h.tracker.log();
    let ids: Vec<String> = log
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("TRIALID"))
        .collect();
    assert_eq!(ids, ["TRIALID 1", "TRIALID 2", "TRIALID 3", "TRIALID 4", "TRIALID 5"]);
    assert_eq!(log.count(&Call::Message("TRIAL_RESULT 0".into())), 5);
    assert_eq!(log.count(&Call::TrackerSetup), 1);
    assert_eq!(log.count(&Call::Close), 1);
    assert_eq!(
        log.count(&Call::ReceiveDataFile {
            remote: "1.EDF".into(),
            local: h.config.data_file_path("1"),
        }),
        1
    );

    let csv = std::fs::read_to_string(h.config.behavioral_dir.join("pp_1.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(
        lines[0],
        "trial_id,block,outcome,sentence,nr_ch_IA1,nr_ch_IA2,nr_ch_IA3,frequency,RT"
    );
    assert!(lines[1].starts_with("1,experiment,ok,"));
    assert!(lines[1].ends_with(",420"));

    // Offline settle, then the data file flush before the transfer.
    let sleeps = h.timer.sleeps();
    assert!(sleeps.ends_with(&[Duration::from_millis(100), Duration::from_millis(500)]));
}

#[test]
fn finalisation_follows_the_viewer_protocol() {
    let mut h = reading(1);
    enter_experiment(&mut h);
    start_trial(&mut h);
    h.timer.advance(Duration::from_millis(100));
    h.machine.handle_input(Input::Space);

    let messages = messages_from_trial(&h, 1);
    assert_eq!(messages[1], "text_onset");
    assert_eq!(messages[2], "space_pressed");
    assert!(messages[3].starts_with("!V IAREA RECTANGLE 1 "));
    assert!(messages[5].starts_with("!V IAREA RECTANGLE 3 "));
    assert!(messages[5].ends_with(" IA3"));
    assert_eq!(messages[6], "!V CLEAR 128 128 128");
    assert_eq!(messages[7], "!V TRIAL_VAR sentence Sentence number 0 ends.");
    assert_eq!(messages.last().unwrap(), "TRIAL_RESULT 0");
    assert_eq!(messages[messages.len() - 2], "!V TRIAL_VAR RT 100");

    let calls = h.tracker.log().calls();
    let stop = calls.iter().position(|c| *c == Call::StopRecording).unwrap();
    let first_area = calls
        .iter()
        .position(|c| matches!(c, Call::Message(m) if m.starts_with("!V IAREA")))
        .unwrap();
    assert!(stop < first_area);
    assert!(h.timer.sleeps().contains(&Duration::from_millis(100)));
    assert!(h.timer.sleeps().contains(&Duration::from_millis(50)));
}

#[test]
fn missing_response_logs_the_timeout_sentinel() {
    let mut h = reading_with(
        1,
        ReadingConfig {
            timeout_ms: Some(2000),
            backdrops: false,
            ..Default::default()
        },
    );
    enter_experiment(&mut h);
    start_trial(&mut h);
    h.timer.advance(Duration::from_millis(1999));
    assert!(h.machine.update().is_empty());
    h.timer.advance(Duration::from_millis(1));
    assert_eq!(h.machine.update(), [ExperimentEvent::TrialComplete(1)]);

    let messages = h.tracker.log().messages();
    assert!(messages.contains(&"timeout_trial".to_string()));
    assert!(messages.contains(&"!V TRIAL_VAR RT timeout".to_string()));
    let record = &h.machine.runner().records()[0];
    assert_eq!(record.response("RT"), Some("timeout"));
}

#[test]
fn escape_skips_only_the_current_trial() {
    let mut h = reading(3);
    enter_experiment(&mut h);
    start_trial(&mut h);
    let events = h.machine.handle_input(Input::Escape);
    assert_eq!(events, [ExperimentEvent::TrialAbandoned(1)]);

    let messages = messages_from_trial(&h, 1);
    assert_eq!(&messages[1..], ["text_onset", "trial_skipped", "TRIAL_RESULT -1"]);

    start_trial(&mut h);
    assert!(h.tracker.log().messages().contains(&"TRIALID 2".to_string()));
    assert_eq!(h.machine.status(), Status::Running);

    let record = &h.machine.runner().records()[0];
    assert_eq!(record.outcome.code(), -1);
    assert_eq!(record.response("RT"), Some(""));
}

#[test]
fn drift_check_repeats_until_accepted() {
    let mut h = reading(1);
    enter_experiment(&mut h);
    h.tracker.script().drift_results([
        Ok(DriftOutcome::Escaped),
        Err("no fixation".to_string()),
        Ok(DriftOutcome::Escaped),
    ]);
    for _ in 0..4 {
        h.machine.update();
        assert_eq!(h.machine.runner().state(), TrialState::DriftChecking);
    }
    h.machine.update();
    assert_eq!(h.machine.runner().state(), TrialState::Recording);

    let drift_calls: Vec<Call> = h
        .tracker
        .log()
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::DriftCorrect { .. }))
        .collect();
    assert_eq!(drift_calls.len(), 4);
    // text start (-200, 0) on a 1920x1080 screen
    assert_eq!(drift_calls[0], Call::DriftCorrect { x: 760, y: 540 });
}

#[test]
fn operator_break_during_drift_check_aborts_once() {
    let mut h = reading(2);
    enter_experiment(&mut h);
    h.machine.update();
    h.tracker.script().press_break();
    assert_eq!(h.machine.update(), [ExperimentEvent::Aborted]);
    assert_eq!(h.machine.status(), Status::Aborted);

    assert!(h.machine.handle_input(Input::Abort).is_empty());
    assert!(h.machine.update().is_empty());

    let log = h.tracker.log();
    assert_eq!(log.count(&Call::Close), 1);
    assert_eq!(log.count(&Call::Message("TRIAL_RESULT -1".into())), 1);
    assert!(log.commands().contains(&"clear_screen 0".to_string()));
    assert!(h.timer.sleeps().contains(&Duration::from_millis(500)));
}

#[test]
fn ctrl_c_mid_trial_aborts_the_experiment() {
    let mut h = reading(2);
    enter_experiment(&mut h);
    start_trial(&mut h);
    assert_eq!(h.machine.handle_input(Input::Abort), [ExperimentEvent::Aborted]);

    let messages = messages_from_trial(&h, 1);
    assert_eq!(&messages[1..], ["text_onset", "experiment_aborted", "TRIAL_RESULT -1"]);
    let log = h.tracker.log();
    assert_eq!(log.count(&Call::StopRecording), 1);
    assert_eq!(log.count(&Call::Close), 1);
    assert!(!log.messages().contains(&"TRIALID 2".to_string()));

    let csv = std::fs::read_to_string(h.config.behavioral_dir.join("pp_1.csv")).unwrap();
    assert!(csv.lines().nth(1).unwrap().starts_with("1,experiment,error,"));
}

#[test]
fn failed_recording_start_moves_to_the_next_trial() {
    let mut h = reading(2);
    enter_experiment(&mut h);
    h.tracker.script().fail_start_recording(true);
    h.machine.update();
    assert_eq!(h.machine.update(), [ExperimentEvent::TrialAbandoned(1)]);
    assert!(!h.machine.runner().session().segment_open());

    h.tracker.script().fail_start_recording(false);
    start_trial(&mut h);
    let messages = h.tracker.log().messages();
    let result = messages.iter().position(|m| m == "TRIAL_RESULT -1").unwrap();
    let next = messages.iter().position(|m| m == "TRIALID 2").unwrap();
    assert!(result < next);
}

#[test]
fn lost_recording_abandons_the_trial() {
    let mut h = reading(2);
    enter_experiment(&mut h);
    start_trial(&mut h);
    h.tracker.script().drop_recording();
    assert_eq!(h.machine.update(), [ExperimentEvent::TrialAbandoned(1)]);
    let messages = messages_from_trial(&h, 1);
    assert_eq!(&messages[1..], ["text_onset", "tracker_disconnected", "TRIAL_RESULT -1"]);
}

#[test]
fn dummy_mode_skips_drift_check_and_calibration() {
    let mut h = harness(
        ParadigmConfig::Reading(ReadingConfig::default()),
        sentences(1),
        TrackerMode::Dummy,
        |_| {},
    );
    enter_experiment(&mut h);
    h.machine.update();
    assert_eq!(h.machine.runner().state(), TrialState::Recording);
    h.machine.handle_input(Input::Space);

    let log = h.tracker.log();
    assert_eq!(log.count(&Call::TrackerSetup), 0);
    assert!(log.calls().iter().all(|c| !matches!(c, Call::DriftCorrect { .. })));
    assert!(log.messages().iter().all(|m| !m.starts_with("!V IMGLOAD")));
    assert!(h.backdrops.0.lock().unwrap().is_empty());
}

#[test]
fn live_reading_trial_saves_a_backdrop() {
    let mut h = reading_with(1, ReadingConfig::default());
    enter_experiment(&mut h);
    start_trial(&mut h);
    h.machine.handle_input(Input::Space);

    let saved = h.backdrops.0.lock().unwrap().clone();
    assert_eq!(saved, [h.config.participant_dir("1").join("1_1.png")]);
    assert!(
        h.tracker
            .log()
            .messages()
            .contains(&"!V IMGLOAD FILL 1_1.png".to_string())
    );
}

#[test]
fn visual_world_click_trial() {
    let mut h = harness(
        ParadigmConfig::VisualWorld(VisualWorldConfig::default()),
        pictures(1),
        TrackerMode::Live,
        |config| config.trial_vars = Some(vec!["trialtype".to_string()]),
    );
    enter_experiment(&mut h);
    start_trial(&mut h);
    h.timer.advance(Duration::from_millis(1500));
    assert!(h.machine.update().is_empty());
    assert!(h.machine.scene().cursor_visible);
    h.timer.advance(Duration::from_millis(250));
    let events = h.machine.handle_input(Input::Click(Point::new(0.0, 0.0)));
    assert_eq!(events, [ExperimentEvent::TrialComplete(1)]);

    let messages = messages_from_trial(&h, 1);
    assert_eq!(
        &messages[1..5],
        ["preview_onset", "audio_onset", "target_onset", "target_offset"]
    );
    let areas = messages[5..9].iter().filter(|m| m.starts_with("!V IAREA RECTANGLE")).count();
    assert_eq!(areas, 4);
    assert_eq!(
        &messages[9..],
        [
            "!V CLEAR 128 128 128",
            "!V TRIAL_VAR trialtype t0",
            "!V TRIAL_VAR RT 250",
            "!V TRIAL_VAR object_clicked none",
            "TRIAL_RESULT 0",
        ]
    );
    assert!(h.timer.sleeps().contains(&Duration::from_millis(300)));
}

#[test]
fn participant_number_cannot_be_reused() {
    let h = reading(1);
    let again = BehavioralLog::create(&h.config.behavioral_dir, "1");
    assert!(again.is_err());
}

/// Practice rows carry no `frequency` column.
fn practice_sentences(n: usize) -> Vec<TrialRow> {
    sentences(n)
        .into_iter()
        .map(|mut row| {
            row.fields.retain(|(name, _)| name != "frequency");
            row
        })
        .collect()
}

#[test]
fn practice_block_runs_before_the_experiment() {
    let mut h = harness_with_practice(
        ParadigmConfig::Reading(ReadingConfig {
            backdrops: false,
            ..Default::default()
        }),
        sentences(2),
        Some(practice_sentences(2)),
        TrackerMode::Live,
        |_| {},
    );
    h.machine.handle_input(Input::Space);
    h.machine.handle_input(Input::Space);
    h.machine.update();
    let events = h.machine.handle_input(Input::Space);
    assert_eq!(events, [ExperimentEvent::PhaseChanged(StandardPhase::Practice)]);

    // Introduction screen until the participant continues.
    assert!(h.machine.is_awaiting_input());
    assert!(h.machine.update().is_empty());
    assert!(h.tracker.log().messages().iter().all(|m| !m.starts_with("TRIALID")));
    h.machine.handle_input(Input::Space);
    assert!(!h.machine.is_awaiting_input());

    for _ in 0..2 {
        start_trial(&mut h);
        h.timer.advance(Duration::from_millis(300));
        h.machine.handle_input(Input::Space);
    }
    let events = h.machine.update();
    assert!(events.contains(&ExperimentEvent::PhaseChanged(StandardPhase::Experiment)));
    assert_eq!(h.machine.phase, StandardPhase::Experiment);

    for _ in 0..2 {
        start_trial(&mut h);
        h.timer.advance(Duration::from_millis(400));
        h.machine.handle_input(Input::Space);
    }
    let events = h.machine.update();
    assert!(events.contains(&ExperimentEvent::PhaseChanged(StandardPhase::Goodbye)));

    let ids: Vec<String> = h
        .tracker
        .log()
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("TRIALID"))
        .collect();
    assert_eq!(ids, ["TRIALID 1", "TRIALID 2", "TRIALID 3", "TRIALID 4"]);

    let csv = std::fs::read_to_string(h.config.behavioral_dir.join("pp_1.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines[0],
        "trial_id,block,outcome,sentence,nr_ch_IA1,nr_ch_IA2,nr_ch_IA3,frequency,RT"
    );
    for line in &lines[1..3] {
        assert!(line.contains(",practice,ok,"));
        assert!(line.ends_with(",,300"));
    }
    for line in &lines[3..5] {
        assert!(line.contains(",experiment,ok,"));
        assert!(line.ends_with(",high,400") || line.ends_with(",low,400"));
    }
}

#[test]
fn condition_column_named_like_a_response_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(
        &dir,
        ParadigmConfig::Reading(ReadingConfig {
            backdrops: false,
            ..Default::default()
        }),
    );
    let (runner, _, _, _) = runner_for(&config, TrackerMode::Live);
    let mut rows = sentences(1);
    rows[0].fields.push(("RT".into(), "0".into()));

    let machine = ExperimentStateMachine::new(
        config,
        runner,
        TrialList::new(rows),
        None,
        StdRng::seed_from_u64(11),
    );
    assert!(matches!(machine, Err(ExperimentError::ReservedColumn(column)) if column == "RT"));
}

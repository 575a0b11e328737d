//! Single-sentence reading: the sentence is shown left-anchored at a fixed
//! start position and the participant presses space when done.

use std::time::Duration;

use gazex_core::geometry::{segment_widths, text_areas};
use gazex_core::scene::TextAnchor;
use gazex_core::{Response, ResponseTime, Scene, TextMetrics, Units, Visual};
use gazex_timing::Timer;
use rand::Rng;
use tracing::debug;

use super::{Procedure, Stage, TrialContext, TrialPlan};
use crate::conditions::TrialRow;
use crate::config::ReadingConfig;
use crate::error::ExperimentError;
use crate::input::Input;

pub const SENTENCE_COLUMN: &str = "sentence";

pub struct Reading {
    config: ReadingConfig,
    metrics: Box<dyn TextMetrics>,
    scene: Option<Scene>,
    answered: bool,
}

impl Reading {
    pub fn new(config: ReadingConfig, metrics: Box<dyn TextMetrics>) -> Self {
        Self {
            config,
            metrics,
            scene: None,
            answered: false,
        }
    }

    fn char_counts(&self, row: &TrialRow) -> Result<Vec<usize>, ExperimentError> {
        (1..=self.config.ia_count)
            .map(|i| row.require_count(&format!("nr_ch_IA{i}")))
            .collect()
    }
}

impl Procedure for Reading {
    fn response_columns(&self) -> &'static [&'static str] {
        &["RT"]
    }

    fn prepare<R: Rng + ?Sized>(
        &mut self,
        row: &TrialRow,
        ctx: &TrialContext<'_>,
        _rng: &mut R,
    ) -> Result<TrialPlan, ExperimentError> {
        let sentence = row.require(SENTENCE_COLUMN)?;
        let counts = self.char_counts(row)?;
        let (width, height) = self.metrics.measure(sentence, self.config.font_size_px);
        let widths = segment_widths(&counts, f64::from(width), sentence.chars().count())?;

        let start = ctx.to_pixels(self.config.text_start);
        let areas = text_areas(
            start,
            &widths,
            f64::from(height),
            self.config.ia_padding,
            Units::Pix,
            ctx.screen,
        );

        let mut scene = Scene::blank(ctx.background).with(Visual::Text {
            content: sentence.to_string(),
            position: start,
            size_px: self.config.font_size_px,
            color: self.config.text_color,
            anchor: TextAnchor::Left,
        });
        if ctx.pilot_areas {
            scene.outline_areas(&areas);
        }
        debug!(trial = ctx.trial_id, width, areas = areas.len(), "reading layout");

        self.scene = Some(scene.clone());
        self.answered = false;
        Ok(TrialPlan {
            scene,
            areas,
            drift_target: Units::Pix.to_device(start, ctx.screen),
            backdrop: self.config.backdrops,
        })
    }

    fn onset<T: Timer>(&mut self, stage: &mut Stage<'_, T>) -> Result<(), ExperimentError> {
        if let Some(scene) = &self.scene {
            stage.show(scene.clone());
        }
        stage.marker("text_onset")?;
        stage.reset_clock();
        Ok(())
    }

    fn poll<T: Timer>(&mut self, stage: &mut Stage<'_, T>) -> Result<Option<Response>, ExperimentError> {
        let Some(ms) = self.config.timeout_ms else {
            return Ok(None);
        };
        if self.answered || stage.clock() < Duration::from_millis(ms) {
            return Ok(None);
        }
        self.answered = true;
        stage.marker("timeout_trial")?;
        Ok(Some(Response::timeout()))
    }

    fn input<T: Timer>(
        &mut self,
        input: &Input,
        stage: &mut Stage<'_, T>,
    ) -> Result<Option<Response>, ExperimentError> {
        if *input != Input::Space || self.answered {
            return Ok(None);
        }
        self.answered = true;
        let rt = ResponseTime::from_elapsed(stage.clock());
        stage.marker("space_pressed")?;
        Ok(Some(Response::new(rt, "space")))
    }

    fn response_values(&self, response: &Response) -> Vec<(String, String)> {
        vec![("RT".to_string(), response.time.to_string())]
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_matches::assert_matches;
    use gazex_core::{MonospaceMetrics, Point, ScreenSize};
    use gazex_timing::ManualTimer;
    use gazex_tracker::{RecordingSession, ScriptedTracker, TrackerMode, TrackerSettings};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::procedure::AudioPlayer;

    struct Silent;

    impl AudioPlayer for Silent {
        fn play(&mut self, _clip: &Path) -> Duration {
            Duration::ZERO
        }
    }

    fn metrics() -> Box<dyn TextMetrics> {
        Box::new(MonospaceMetrics {
            advance: 0.5,
            line_height: 1.0,
        })
    }

    fn row() -> TrialRow {
        TrialRow::new(
            0,
            vec![
                ("sentence".into(), "The old man the boat.".into()),
                ("nr_ch_IA1".into(), "8".into()),
                ("nr_ch_IA2".into(), "4".into()),
                ("nr_ch_IA3".into(), "9".into()),
            ],
        )
    }

    fn ctx(units: Units) -> TrialContext<'static> {
        TrialContext {
            trial_id: 2,
            participant: "5",
            screen: ScreenSize::new(1920, 1080),
            units,
            background: [128, 128, 128, 255],
            pilot_areas: true,
        }
    }

    #[test]
    fn segments_tile_the_sentence_from_its_start() {
        let mut reading = Reading::new(
            ReadingConfig {
                font_size_px: 20.0,
                ..Default::default()
            },
            metrics(),
        );
        let plan = reading
            .prepare(&row(), &ctx(Units::Pix), &mut StdRng::seed_from_u64(0))
            .unwrap();
        // 21 characters at 10 px each
        let lefts: Vec<i32> = plan.areas.iter().map(|a| a.left).collect();
        let rights: Vec<i32> = plan.areas.iter().map(|a| a.right).collect();
        assert_eq!(lefts, [760, 840, 880]);
        assert_eq!(rights, [840, 880, 970]);
        assert!(plan.areas.iter().all(|a| a.top == 490 && a.bottom == 590));
        assert_eq!(plan.areas[2].label, "IA3");
        assert_eq!((plan.drift_target.x, plan.drift_target.y), (760.0, 540.0));
        assert!(plan.backdrop);
        let outlines = plan
            .scene
            .visuals
            .iter()
            .filter(|v| matches!(v, Visual::Outline { .. }))
            .count();
        assert_eq!(outlines, 3);
    }

    #[test]
    fn normalised_start_is_converted_for_drift_check() {
        let mut reading = Reading::new(
            ReadingConfig {
                text_start: Point::new(-0.5, 0.5),
                ..Default::default()
            },
            metrics(),
        );
        let plan = reading
            .prepare(&row(), &ctx(Units::Norm), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!((plan.drift_target.x, plan.drift_target.y), (480.0, 270.0));
    }

    #[test]
    fn missing_character_count_is_an_error() {
        let mut reading = Reading::new(
            ReadingConfig {
                ia_count: 4,
                ..Default::default()
            },
            metrics(),
        );
        assert_matches!(
            reading.prepare(&row(), &ctx(Units::Pix), &mut StdRng::seed_from_u64(0)),
            Err(ExperimentError::MissingColumn(c)) if c == "nr_ch_IA4"
        );
    }

    #[test]
    fn space_or_timeout_ends_the_trial() {
        let tracker = ScriptedTracker::new();
        let timer = ManualTimer::new();
        let mut session = RecordingSession::new(
            Box::new(tracker.clone()),
            TrackerMode::Live,
            TrackerSettings::default(),
            timer.clone(),
        );
        let mut reading = Reading::new(
            ReadingConfig {
                timeout_ms: Some(5000),
                ..Default::default()
            },
            metrics(),
        );
        reading
            .prepare(&row(), &ctx(Units::Pix), &mut StdRng::seed_from_u64(0))
            .unwrap();
        let mut scene = Scene::blank([0, 0, 0, 255]);
        let mut clock = timer.now();
        let mut audio = Silent;
        let mut stage = Stage::new(&mut session, &mut audio, &mut scene, &mut clock);

        reading.onset(&mut stage).unwrap();
        timer.advance(Duration::from_millis(4999));
        assert_eq!(reading.poll(&mut stage).unwrap(), None);
        timer.advance(Duration::from_millis(1));
        let response = reading.poll(&mut stage).unwrap().unwrap();
        assert_eq!(reading.response_values(&response)[0].1, "timeout");
        assert_eq!(reading.input(&Input::Space, &mut stage).unwrap(), None);

        reading
            .prepare(&row(), &ctx(Units::Pix), &mut StdRng::seed_from_u64(0))
            .unwrap();
        reading.onset(&mut stage).unwrap();
        timer.advance(Duration::from_millis(1234));
        let response = reading.input(&Input::Space, &mut stage).unwrap().unwrap();
        assert_eq!(response.time, ResponseTime::Millis(1234));
        assert_eq!(
            tracker.log().messages(),
            ["text_onset", "timeout_trial", "text_onset", "space_pressed"]
        );
    }
}

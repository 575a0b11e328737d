//! Visual world paradigm: pictures in the screen quadrants, a spoken carrier
//! phrase and target word, then a click on (or a look at) the named object.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gazex_core::geometry::{hit_test, image_area, quadrant_positions};
use gazex_core::{Point, Response, ResponseTime, Scene, Units, Visual};
use gazex_timing::Timer;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::{Procedure, Stage, TrialContext, TrialPlan};
use crate::conditions::TrialRow;
use crate::config::{Task, VisualWorldConfig};
use crate::error::ExperimentError;
use crate::input::Input;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Preview,
    Responding,
    Done,
}

#[derive(Debug, Clone)]
struct Layout {
    scene: Scene,
    centers: Vec<Point>,
    labels: Vec<String>,
    carrier: PathBuf,
    target: PathBuf,
    step: Step,
}

#[derive(Debug)]
pub struct VisualWorld {
    config: VisualWorldConfig,
    layout: Option<Layout>,
}

impl VisualWorld {
    pub fn new(config: VisualWorldConfig) -> Self {
        Self {
            config,
            layout: None,
        }
    }

    fn stimulus(&self, name: &str, extension: &str) -> PathBuf {
        let path = self.config.stimulus_dir.join(name);
        if Path::new(name).extension().is_some() {
            path
        } else {
            path.with_extension(extension)
        }
    }

    fn preview(&self) -> Duration {
        Duration::from_millis(self.config.preview_ms)
    }

    /// How long a look-only trial keeps recording after the target word.
    fn listening_window(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms.unwrap_or(0))
    }

    fn play_sentence<T: Timer>(&mut self, stage: &mut Stage<'_, T>) -> Result<(), ExperimentError> {
        let Some(layout) = self.layout.as_mut() else {
            return Ok(());
        };
        stage.marker("audio_onset")?;
        stage.play(&layout.carrier);
        stage.marker("target_onset")?;
        stage.play(&layout.target);
        stage.marker("target_offset")?;
        stage.reset_clock();
        stage.scene_mut().cursor_visible = true;
        layout.step = Step::Responding;
        Ok(())
    }
}

impl Procedure for VisualWorld {
    fn response_columns(&self) -> &'static [&'static str] {
        &["RT", "object_clicked"]
    }

    fn prepare<R: Rng + ?Sized>(
        &mut self,
        row: &TrialRow,
        ctx: &TrialContext<'_>,
        rng: &mut R,
    ) -> Result<TrialPlan, ExperimentError> {
        let count = self.config.image_count;
        let mut centers = quadrant_positions(count, ctx.screen)?;
        centers.shuffle(rng);

        let (w, h) = self.config.image_size;
        let mut scene = Scene::blank(ctx.background);
        let mut areas = Vec::with_capacity(count);
        let mut labels = Vec::with_capacity(count);
        for (i, center) in (1..=count).zip(centers.iter().copied()) {
            let image = row.require(&format!("image_{i}_ID"))?;
            let label = row.require(&format!("image_{i}_label"))?;
            scene.visuals.push(Visual::Image {
                path: self.stimulus(image, &self.config.image_extension),
                center,
                size: (w as f32, h as f32),
            });
            areas.push(image_area(
                i,
                center,
                (w, h),
                self.config.ia_padding,
                Units::Pix,
                ctx.screen,
                format!("IA{i}_{label}"),
            ));
            labels.push(label.to_string());
        }
        if ctx.pilot_areas {
            scene.outline_areas(&areas);
        }

        let carrier = self.stimulus(row.require("audio1")?, &self.config.audio_extension);
        let target = self.stimulus(row.require("audio2")?, &self.config.audio_extension);
        debug!(trial = ctx.trial_id, ?labels, "visual world layout");

        self.layout = Some(Layout {
            scene: scene.clone(),
            centers,
            labels,
            carrier,
            target,
            step: Step::Preview,
        });
        Ok(TrialPlan {
            scene,
            areas,
            drift_target: ctx.screen.device_center(),
            backdrop: false,
        })
    }

    fn onset<T: Timer>(&mut self, stage: &mut Stage<'_, T>) -> Result<(), ExperimentError> {
        let Some(layout) = self.layout.as_mut() else {
            return Ok(());
        };
        layout.step = Step::Preview;
        stage.show(layout.scene.clone());
        stage.marker("preview_onset")?;
        stage.reset_clock();
        Ok(())
    }

    fn poll<T: Timer>(&mut self, stage: &mut Stage<'_, T>) -> Result<Option<Response>, ExperimentError> {
        let step = match &self.layout {
            Some(layout) => layout.step,
            None => return Ok(None),
        };
        if step == Step::Preview {
            if stage.clock() < self.preview() {
                return Ok(None);
            }
            self.play_sentence(stage)?;
        }
        if step == Step::Done {
            return Ok(None);
        }

        let response = match self.config.task {
            Task::Look if stage.clock() >= self.listening_window() => {
                Some(Response::new(ResponseTime::NotApplicable, "NA"))
            }
            Task::Click => match self.config.timeout_ms {
                Some(ms) if stage.clock() >= Duration::from_millis(ms) => Some(Response::timeout()),
                _ => None,
            },
            _ => None,
        };
        if response.is_some() {
            if let Some(layout) = self.layout.as_mut() {
                layout.step = Step::Done;
            }
        }
        Ok(response)
    }

    fn input<T: Timer>(
        &mut self,
        input: &Input,
        stage: &mut Stage<'_, T>,
    ) -> Result<Option<Response>, ExperimentError> {
        let Input::Click(p) = input else {
            return Ok(None);
        };
        if self.config.task != Task::Click {
            return Ok(None);
        }
        let Some(layout) = self.layout.as_mut() else {
            return Ok(None);
        };
        if layout.step != Step::Responding {
            return Ok(None);
        }
        let clicked = hit_test(*p, &layout.centers, self.config.image_size)
            .and_then(|i| layout.labels.get(i))
            .map_or("none", String::as_str);
        layout.step = Step::Done;
        Ok(Some(Response::new(
            ResponseTime::from_elapsed(stage.clock()),
            clicked,
        )))
    }

    fn response_values(&self, response: &Response) -> Vec<(String, String)> {
        vec![
            ("RT".to_string(), response.time.to_string()),
            ("object_clicked".to_string(), response.identity.clone()),
        ]
    }
}

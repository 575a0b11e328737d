use std::sync::Arc;

use anyhow::{Result, anyhow};
use gazex_core::{DevicePoint, Phase, Point, ScreenSize, Units};
use gazex_experiment::{ExperimentEvent, Input, Status};
use gazex_render::{SceneRenderer, SharedFont};
use gazex_timing::{HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, ModifiersState, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

use crate::setup::{Experiment, Startup};

/// Frames between frame-timing log lines.
const STATS_EVERY: u64 = 600;

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SceneRenderer>,
    experiment: Experiment,
    font: Option<SharedFont>,
    timer: HighPrecisionTimer,

    cursor: Option<PhysicalPosition<f64>>,
    cursor_visible: bool,
    modifiers: ModifiersState,
    refresh_rate: Option<f64>,
    frames: u64,

    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(startup: Startup) -> Self {
        Self {
            window: None,
            pixels: None,
            renderer: None,
            experiment: startup.experiment,
            font: startup.font,
            timer: HighPrecisionTimer::new(),
            cursor: None,
            cursor_visible: false,
            modifiers: ModifiersState::empty(),
            refresh_rate: None,
            frames: 0,
            error: None,
        }
    }

    /// Runs the event loop until the experiment completes or is aborted.
    pub fn run(mut self) -> Result<Status> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(&mut self)?;
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        match self.experiment.status() {
            Status::Running => Err(anyhow!("event loop ended before the experiment finished")),
            status => Ok(status),
        }
    }

    fn screen(&self) -> ScreenSize {
        self.experiment.config.screen
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;

        self.refresh_rate = monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let attributes = Window::default_attributes()
            .with_title(self.experiment.config.name.clone())
            .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(attributes)?);
        let physical = window.inner_size();
        let screen = self.screen();
        info!(
            width = physical.width,
            height = physical.height,
            scale = window.scale_factor(),
            refresh_hz = self.refresh_rate,
            "display ready"
        );
        if (physical.width, physical.height) != (screen.width, screen.height) {
            warn!(
                screen_width = screen.width,
                screen_height = screen.height,
                "display size differs from the configured screen, frames are scaled"
            );
        }

        // The buffer keeps the configured resolution so interest areas and
        // backdrops line up with what is shown.
        let surface = SurfaceTexture::new(physical.width, physical.height, window.clone());
        self.pixels = Some(Pixels::new(screen.width, screen.height, surface)?);
        self.renderer = Some(SceneRenderer::new(screen.width, screen.height, self.font.clone())?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        let scene = self.experiment.scene();
        let stats = renderer.render_frame(scene, pixels.frame_mut(), &self.timer)?;
        let t = self.timer.now();
        pixels.render()?;
        let present = self.timer.elapsed(t);
        self.timer.record_frame(stats.total + present);

        if stats.redrawn {
            debug!(
                draw_ms = stats.draw.as_secs_f64() * 1e3,
                copy_ms = stats.copy.as_secs_f64() * 1e3,
                "scene changed"
            );
        }
        self.frames += 1;
        if self.frames % STATS_EVERY == 0 {
            let frame = self.timer.frame_stats();
            let draw = renderer.draw_stats();
            debug!(
                fps = frame.effective_fps,
                jitter_ms = frame.jitter_ns / 1e6,
                max_ms = frame.max_frame_time_ns / 1e6,
                redraws = draw.frames,
                "frame timing"
            );
        }

        let want_cursor = scene.cursor_visible;
        self.sync_cursor(want_cursor);
        Ok(())
    }

    /// Shows or hides the mouse pointer; a newly shown pointer starts at the
    /// middle of the display.
    fn sync_cursor(&mut self, visible: bool) {
        if visible == self.cursor_visible {
            return;
        }
        self.cursor_visible = visible;
        let Some(window) = &self.window else {
            return;
        };
        window.set_cursor_visible(visible);
        if visible {
            let size = window.inner_size();
            let centre = PhysicalPosition::new(size.width / 2, size.height / 2);
            if let Err(e) = window.set_cursor_position(centre) {
                warn!(error = %e, "could not centre the cursor");
            }
        }
    }

    fn map_key(&self, event: &KeyEvent) -> Option<Input> {
        match event.physical_key {
            PhysicalKey::Code(KeyCode::KeyC) if self.modifiers.control_key() => Some(Input::Abort),
            PhysicalKey::Code(KeyCode::Space) => Some(Input::Space),
            PhysicalKey::Code(KeyCode::Escape) => Some(Input::Escape),
            _ => event.text.as_ref().map(|t| Input::Key(t.to_string())),
        }
    }

    /// Window position of the pointer in presentation pixels.
    fn click_position(&self) -> Option<Point> {
        let pixels = self.pixels.as_ref()?;
        let cursor = self.cursor?;
        let (x, y) = pixels
            .window_pos_to_pixel((cursor.x as f32, cursor.y as f32))
            .ok()?;
        let device = DevicePoint {
            x: x as f64,
            y: y as f64,
        };
        Some(Units::Pix.from_device(device, self.screen()))
    }

    fn dispatch(&mut self, input: Input, event_loop: &ActiveEventLoop) {
        debug!(?input, "input");
        let events = self.experiment.handle_input(input);
        self.after(events, event_loop);
    }

    fn update(&mut self, event_loop: &ActiveEventLoop) {
        let events = self.experiment.update();
        self.after(events, event_loop);
    }

    fn after(&mut self, events: Vec<ExperimentEvent>, event_loop: &ActiveEventLoop) {
        for event in &events {
            match event {
                ExperimentEvent::PhaseChanged(phase) if phase.runs_trials() => {
                    if let Some((done, total)) = self.experiment.trial_progress() {
                        info!(?phase, done, total, "trials");
                    }
                }
                ExperimentEvent::TrialAbandoned(id) => warn!(trial = id, "trial abandoned"),
                _ => {}
            }
        }
        if self.experiment.status() != Status::Running {
            self.exit(event_loop);
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(size.width, size.height) {
                warn!(error = %e, "failed to resize surface");
            }
        }
        debug!(width = size.width, height = size.height, "display resized");
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        match self.experiment.status() {
            Status::Completed => info!("experiment completed, results saved"),
            status => info!(?status, "experiment stopped"),
        }
        event_loop.exit();
    }

    fn fail(&mut self, err: anyhow::Error, event_loop: &ActiveEventLoop) {
        error!("{err:#}");
        // Close the session and keep whatever data exists.
        if self.experiment.status() == Status::Running {
            self.experiment.handle_input(Input::Abort);
        }
        self.error = Some(err);
        self.exit(event_loop);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                self.fail(e.context("creating the window"), event_loop);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.dispatch(Input::Abort, event_loop),
            WindowEvent::RedrawRequested => {
                self.update(event_loop);
                if let Err(e) = self.render() {
                    self.fail(e, event_loop);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::ModifiersChanged(modifiers) => self.modifiers = modifiers.state(),
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                if let Some(input) = self.map_key(&event) {
                    self.dispatch(input, event_loop);
                }
            }
            WindowEvent::CursorMoved { position, .. } => self.cursor = Some(position),
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(point) = self.click_position() {
                    self.dispatch(Input::Click(point), event_loop);
                }
            }
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.resize(size);
                }
            }
            _ => {}
        }
    }
}

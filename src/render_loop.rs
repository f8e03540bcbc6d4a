// render_loop.rs
// Per-frame driver. A tick reads the clock, steps the camera controls,
// advances every mixer, renders, then clamps the camera. Nothing else runs
// between those steps, so load continuations only ever land between ticks.

use crate::error::RenderError;
use crate::scene::{Camera, SceneGraph};
use crate::stage::Stage;
use crate::time::FrameClock;

/// Rasterization backend. Consumes the scene and camera and produces a frame.
pub trait SceneRenderer {
    fn render(&mut self, graph: &SceneGraph, camera: &Camera) -> Result<(), RenderError>;

    /// Logical size of the drawing area.
    fn set_viewport(&mut self, width: u32, height: u32);

    fn set_pixel_density(&mut self, ratio: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    /// The renderer is considered permanently unusable.
    Halted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The loop is not running; nothing was advanced.
    Skipped,
    Rendered { delta: f64, clamped: bool },
    Failed {
        delta: f64,
        clamped: bool,
        error: RenderError,
        halted: bool,
    },
}

pub struct RenderLoop {
    clock: FrameClock,
    state: LoopState,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    frames: u64,
    failed_frames: u64,
}

impl RenderLoop {
    pub fn new(clock: FrameClock, max_consecutive_failures: u32) -> Self {
        Self {
            clock,
            state: LoopState::Idle,
            max_consecutive_failures: max_consecutive_failures.max(1),
            consecutive_failures: 0,
            frames: 0,
            failed_frames: 0,
        }
    }

    /// Idle -> Running. The first tick measures from this call, not from
    /// the creation of the clock.
    pub fn start(&mut self) {
        if self.state != LoopState::Idle {
            return;
        }
        let seed = self.clock.tick();
        log::info!("Render loop started at {:.3}s", seed.elapsed);
        self.state = LoopState::Running;
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn failed_frames(&self) -> u64 {
        self.failed_frames
    }

    pub fn clock_faults(&self) -> u64 {
        self.clock.faults()
    }

    pub fn tick(&mut self, stage: &mut Stage, renderer: &mut dyn SceneRenderer) -> TickOutcome {
        if self.state != LoopState::Running {
            return TickOutcome::Skipped;
        }

        let delta = self.clock.tick().delta;
        stage.update_controls();
        stage.advance_animations(delta as f32);
        let result = renderer.render(&stage.graph, &stage.camera);
        let clamped = stage.apply_bounds();
        self.frames += 1;

        match result {
            Ok(()) => {
                self.consecutive_failures = 0;
                TickOutcome::Rendered { delta, clamped }
            }
            Err(error) => {
                self.failed_frames += 1;
                self.consecutive_failures += 1;
                let halted = !error.is_transient()
                    || self.consecutive_failures >= self.max_consecutive_failures;
                if halted {
                    log::error!(
                        "Renderer unusable after {} failed frame(s): {}",
                        self.consecutive_failures,
                        error
                    );
                    self.state = LoopState::Halted;
                } else {
                    log::warn!("Frame {} failed: {}", self.frames, error);
                }
                TickOutcome::Failed {
                    delta,
                    clamped,
                    error,
                    halted,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::GlobalParams;
    use crate::settings::CameraSettings;
    use crate::time::TimeSource;
    use glam::Vec3;
    use std::cell::Cell;
    use std::collections::VecDeque;

    struct Steps(Cell<f64>, f64);

    impl TimeSource for Steps {
        fn elapsed_seconds(&self) -> f64 {
            let now = self.0.get() + self.1;
            self.0.set(now);
            now
        }
    }

    struct Scripted {
        results: VecDeque<Result<(), RenderError>>,
        eyes: Vec<Vec3>,
    }

    impl SceneRenderer for Scripted {
        fn render(&mut self, _: &SceneGraph, camera: &Camera) -> Result<(), RenderError> {
            self.eyes.push(camera.eye);
            self.results.pop_front().unwrap_or(Ok(()))
        }
        fn set_viewport(&mut self, _: u32, _: u32) {}
        fn set_pixel_density(&mut self, _: f64) {}
    }

    fn scripted(results: Vec<Result<(), RenderError>>) -> Scripted {
        Scripted {
            results: results.into(),
            eyes: Vec::new(),
        }
    }

    fn setup(max_failures: u32) -> (RenderLoop, Stage) {
        let clock = FrameClock::new(Box::new(Steps(Cell::new(0.0), 0.25)));
        let stage = Stage::new(&CameraSettings::default(), GlobalParams::default());
        (RenderLoop::new(clock, max_failures), stage)
    }

    #[test]
    fn idle_loop_does_not_tick() {
        let (mut render_loop, mut stage) = setup(3);
        let mut renderer = scripted(vec![]);
        assert_eq!(render_loop.tick(&mut stage, &mut renderer), TickOutcome::Skipped);
        assert!(renderer.eyes.is_empty());

        render_loop.start();
        assert_eq!(
            render_loop.tick(&mut stage, &mut renderer),
            TickOutcome::Rendered {
                delta: 0.25,
                clamped: false
            }
        );
    }

    #[test]
    fn clamp_runs_after_render() {
        let (mut render_loop, mut stage) = setup(3);
        let mut renderer = scripted(vec![]);
        render_loop.start();
        stage.controls.target = Vec3::new(150.0, -3.0, 10.0);
        stage.camera.eye = Vec3::new(150.0, -3.0, 20.0);

        let outcome = render_loop.tick(&mut stage, &mut renderer);
        assert!(matches!(outcome, TickOutcome::Rendered { clamped: true, .. }));
        assert!(renderer.eyes[0].x > 100.0);
        assert!(stage.camera.eye.x <= 100.0 && stage.camera.eye.y >= 1.0);
    }

    #[test]
    fn transient_failures_are_survived() {
        let (mut render_loop, mut stage) = setup(3);
        let mut renderer = scripted(vec![
            Err(RenderError::SurfaceLost),
            Err(RenderError::Timeout),
            Ok(()),
            Err(RenderError::SurfaceOutdated),
        ]);
        render_loop.start();
        for _ in 0..6 {
            render_loop.tick(&mut stage, &mut renderer);
        }
        assert!(render_loop.is_running());
        assert_eq!(render_loop.frames(), 6);
        assert_eq!(render_loop.failed_frames(), 3);
    }

    #[test]
    fn repeated_or_permanent_failure_halts() {
        let (mut render_loop, mut stage) = setup(2);
        let mut renderer = scripted(vec![Err(RenderError::Timeout), Err(RenderError::Timeout)]);
        render_loop.start();
        render_loop.tick(&mut stage, &mut renderer);
        assert!(render_loop.is_running());
        let outcome = render_loop.tick(&mut stage, &mut renderer);
        assert!(matches!(outcome, TickOutcome::Failed { halted: true, .. }));
        assert_eq!(render_loop.state(), LoopState::Halted);
        assert_eq!(render_loop.tick(&mut stage, &mut renderer), TickOutcome::Skipped);

        let (mut render_loop, mut stage) = setup(10);
        let mut renderer = scripted(vec![Err(RenderError::OutOfMemory)]);
        render_loop.start();
        render_loop.tick(&mut stage, &mut renderer);
        assert_eq!(render_loop.state(), LoopState::Halted);
    }
}

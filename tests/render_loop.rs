mod common;

use common::{model, RecordingRenderer, ScriptedTime};
use glam::Vec3;
use orbit_showcase::error::RenderError;
use orbit_showcase::render_loop::{LoopState, RenderLoop, SceneRenderer, TickOutcome};
use orbit_showcase::scene::{Camera, CameraBounds, GlobalParams, SceneGraph, Transform};
use orbit_showcase::settings::CameraSettings;
use orbit_showcase::stage::Stage;
use orbit_showcase::time::FrameClock;

fn stage() -> Stage {
    Stage::new(&CameraSettings::default(), GlobalParams::default())
}

fn running_loop(time: ScriptedTime, max_failures: u32) -> RenderLoop {
    let mut render_loop = RenderLoop::new(FrameClock::new(Box::new(time)), max_failures);
    render_loop.start();
    render_loop
}

#[test]
fn camera_pushed_out_of_bounds_is_clamped_after_the_frame() {
    let mut stage = stage();
    assert_eq!(stage.camera.eye, Vec3::new(-10.0, 6.0, 10.0));

    stage.controls.target = Vec3::new(150.0, -3.0, 0.0);
    stage.camera.eye = Vec3::new(150.0, -3.0, 10.0);

    let mut renderer = RecordingRenderer::default();
    let mut render_loop = running_loop(ScriptedTime::steps(1.0 / 60.0), 3);
    let outcome = render_loop.tick(&mut stage, &mut renderer);

    assert!(matches!(outcome, TickOutcome::Rendered { clamped: true, .. }));
    assert!(renderer.rendered_eyes()[0].abs_diff_eq(Vec3::new(150.0, -3.0, 10.0), 1e-4));
    assert!(stage.camera.eye.abs_diff_eq(Vec3::new(100.0, 1.0, 10.0), 1e-4));
}

#[test]
fn clamp_is_one_sided_and_leaves_valid_positions_alone() {
    let bounds = CameraBounds::default();
    let samples = [
        Vec3::new(-500.0, 50.0, -500.0),
        Vec3::new(99.0, 1.0, 100.0),
        Vec3::new(101.0, 0.0, 101.0),
        Vec3::new(-10.0, 6.0, 10.0),
        Vec3::new(0.0, -1000.0, 0.0),
    ];
    for position in samples {
        let clamped = bounds.clamp(position);
        assert!(clamped.y >= bounds.min_height);
        assert!(clamped.x <= bounds.max_x);
        assert!(clamped.z <= bounds.max_z);
        let inside = position.y >= 1.0 && position.x <= 100.0 && position.z <= 100.0;
        if inside {
            assert_eq!(clamped, position);
        }
    }
    assert_eq!(bounds.clamp(Vec3::new(-500.0, 50.0, -500.0)), Vec3::new(-500.0, 50.0, -500.0));
}

#[test]
fn backwards_clock_yields_zero_delta() {
    let mut stage = stage();
    let mut renderer = RecordingRenderer::default();
    let mut render_loop = running_loop(ScriptedTime::readings(&[0.0, 1.0, 0.5, 0.75]), 3);

    let deltas: Vec<f64> = (0..3)
        .map(|_| match render_loop.tick(&mut stage, &mut renderer) {
            TickOutcome::Rendered { delta, .. } => delta,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(deltas, vec![1.0, 0.0, 0.25]);
    assert_eq!(render_loop.clock_faults(), 1);
}

/// Records where the animated body was when each frame was drawn.
struct BodyRecorder {
    positions: Vec<f32>,
}

impl SceneRenderer for BodyRecorder {
    fn render(&mut self, graph: &SceneGraph, _: &Camera) -> Result<(), RenderError> {
        let body = graph.find_by_name("body").ok_or(RenderError::Other("no body".into()))?;
        let world = graph.world_transform(body).ok_or(RenderError::Other("no transform".into()))?;
        self.positions.push(world.translation.x);
        Ok(())
    }
    fn set_viewport(&mut self, _: u32, _: u32) {}
    fn set_pixel_density(&mut self, _: f64) {}
}

#[test]
fn frames_draw_animation_state_advanced_by_that_frames_delta() {
    let mut stage = stage();
    let instance = stage.insert_model(&model("models/protein.gltf"), "protein", Transform::IDENTITY);
    stage.play(&instance, 0);

    let mut recorder = BodyRecorder { positions: Vec::new() };
    let mut render_loop = running_loop(ScriptedTime::steps(0.25), 3);
    for _ in 0..3 {
        render_loop.tick(&mut stage, &mut recorder);
    }
    // Clip 0 moves x by 2 units per second.
    assert_eq!(recorder.positions.len(), 3);
    for (frame, x) in recorder.positions.iter().enumerate() {
        assert!((x - 0.5 * (frame + 1) as f32).abs() < 1e-4, "frame {} at {}", frame, x);
    }
}

#[test]
fn transient_failures_do_not_stop_scheduling() {
    let mut stage = stage();
    let mut renderer = RecordingRenderer::failing(vec![
        Err(RenderError::SurfaceLost),
        Ok(()),
        Err(RenderError::Timeout),
        Err(RenderError::SurfaceOutdated),
        Ok(()),
    ]);
    let mut render_loop = running_loop(ScriptedTime::steps(0.1), 3);
    for _ in 0..8 {
        render_loop.tick(&mut stage, &mut renderer);
    }
    assert_eq!(render_loop.state(), LoopState::Running);
    assert_eq!(render_loop.frames(), 8);
    assert_eq!(render_loop.failed_frames(), 3);
    assert_eq!(renderer.rendered_eyes().len(), 8);
}

#[test]
fn renderer_failing_every_tick_halts_the_loop() {
    let mut stage = stage();
    let mut renderer = RecordingRenderer::failing(vec![Err(RenderError::SurfaceLost); 5]);
    let mut render_loop = running_loop(ScriptedTime::steps(0.1), 3);

    let outcomes: Vec<TickOutcome> = (0..5)
        .map(|_| render_loop.tick(&mut stage, &mut renderer))
        .collect();
    assert!(matches!(outcomes[1], TickOutcome::Failed { halted: false, .. }));
    assert!(matches!(outcomes[2], TickOutcome::Failed { halted: true, .. }));
    assert_eq!(outcomes[3], TickOutcome::Skipped);
    assert_eq!(renderer.rendered_eyes().len(), 3);
    assert_eq!(render_loop.state(), LoopState::Halted);
}

// app.rs
use std::sync::Arc;

use glam::Vec2;
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::error::StartupError;
use crate::render_loop::{SceneRenderer, TickOutcome};
use crate::renderer::WgpuRenderer;
use crate::scene::OrbitInput;
use crate::settings::ShowcaseSettings;
use crate::showcase::Showcase;

/// Wheel pixels per line step on touchpads that report pixel deltas.
const PIXELS_PER_LINE: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    None,
    Changed,
    Listed,
    Exit,
}

/// Keyboard stand-in for a slider panel: one binding is selected at a time
/// and the arrow keys move it by its step.
#[derive(Debug, Default)]
pub struct ControlPanel {
    selected: usize,
    shift: bool,
}

impl ControlPanel {
    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn set_shift(&mut self, held: bool) {
        self.shift = held;
    }

    pub fn handle_key(&mut self, key: &Key, showcase: &mut Showcase) -> PanelAction {
        let count = showcase.params.len();
        if count == 0 {
            return PanelAction::None;
        }
        self.selected %= count;

        match key {
            Key::Named(NamedKey::Escape) => PanelAction::Exit,
            Key::Named(NamedKey::Tab) => {
                self.selected = if self.shift {
                    (self.selected + count - 1) % count
                } else {
                    (self.selected + 1) % count
                };
                if let Some(name) = showcase.params.names().nth(self.selected) {
                    log::info!("Selected {}", name);
                }
                PanelAction::None
            }
            Key::Named(NamedKey::ArrowUp) => self.nudge(showcase, 1.0),
            Key::Named(NamedKey::ArrowDown) => self.nudge(showcase, -1.0),
            Key::Character(c) if c.eq_ignore_ascii_case("h") => {
                for (index, line) in showcase.describe_parameters().iter().enumerate() {
                    let marker = if index == self.selected { '>' } else { ' ' };
                    log::info!("{} {}", marker, line);
                }
                PanelAction::Listed
            }
            _ => PanelAction::None,
        }
    }

    fn nudge(&self, showcase: &mut Showcase, direction: f32) -> PanelAction {
        let Some(name) = showcase.params.names().nth(self.selected).map(str::to_string) else {
            return PanelAction::None;
        };
        let steps = if self.shift { direction * 100.0 } else { direction };
        match showcase.nudge_parameter(&name, steps) {
            Ok(_) => PanelAction::Changed,
            Err(err) => {
                log::warn!("{}", err);
                PanelAction::None
            }
        }
    }
}

#[derive(Debug, Default)]
struct Pointer {
    position: Option<Vec2>,
    rotating: bool,
    panning: bool,
}

pub struct App {
    settings: ShowcaseSettings,
    showcase: Showcase,
    window: Option<Arc<Window>>,
    renderer: Option<WgpuRenderer>,
    startup_error: Option<StartupError>,
    pointer: Pointer,
    panel: ControlPanel,
}

impl App {
    pub fn new(settings: ShowcaseSettings, showcase: Showcase) -> Self {
        Self {
            settings,
            showcase,
            window: None,
            renderer: None,
            startup_error: None,
            pointer: Pointer::default(),
            panel: ControlPanel::default(),
        }
    }

    /// The error that stopped the window or renderer from coming up, if any.
    pub fn take_startup_error(&mut self) -> Option<StartupError> {
        self.startup_error.take()
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), StartupError> {
        let resolution = &self.settings.render.resolution;
        let attributes = Window::default_attributes()
            .with_title("Orbit showcase")
            .with_inner_size(LogicalSize::new(resolution.width, resolution.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| StartupError::Window(err.to_string()))?,
        );

        let mut renderer =
            pollster::block_on(WgpuRenderer::new(Arc::clone(&window), &self.settings.render))?;

        let logical = window.inner_size().to_logical::<u32>(window.scale_factor());
        self.showcase.resize(logical.width, logical.height, &mut renderer);
        self.showcase.start();
        log::info!("Press H to list the light controls, Tab to select, Up/Down to adjust");

        window.request_redraw();
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn logical_cursor(&self, position: PhysicalPosition<f64>) -> Vec2 {
        let scale = self.window.as_ref().map(|w| w.scale_factor()).unwrap_or(1.0);
        let logical = position.to_logical::<f32>(scale);
        Vec2::new(logical.x, logical.y)
    }

    fn on_cursor_moved(&mut self, position: Vec2) {
        if let Some(previous) = self.pointer.position {
            let delta = position - previous;
            if self.pointer.rotating {
                self.showcase.stage.queue_input(OrbitInput {
                    rotate: delta,
                    ..Default::default()
                });
            } else if self.pointer.panning {
                self.showcase.stage.queue_input(OrbitInput {
                    pan: delta,
                    ..Default::default()
                });
            }
        }
        self.pointer.position = Some(position);
    }

    fn redraw(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let outcome = self.showcase.frame(renderer);
        if let TickOutcome::Failed { halted: true, .. } = outcome {
            log::error!("Renderer can no longer produce frames; the window stays open without redrawing");
        }
        if !schedules_next_frame(&outcome) {
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

/// Whether a tick should be followed by another redraw request. A halted loop
/// keeps the window and event loop alive but stops scheduling frames.
fn schedules_next_frame(outcome: &TickOutcome) -> bool {
    !matches!(outcome, TickOutcome::Skipped | TickOutcome::Failed { halted: true, .. })
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            log::error!("Startup failed: {}", err);
            self.startup_error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().map(|w| w.id()) != Some(id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                let scale = self.window.as_ref().map(|w| w.scale_factor()).unwrap_or(1.0);
                let logical = size.to_logical::<u32>(scale);
                if let Some(renderer) = self.renderer.as_mut() {
                    self.showcase.resize(logical.width, logical.height, renderer);
                }
                log::info!("Resized to {}x{} (scale {})", logical.width, logical.height, scale);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.set_pixel_density(scale_factor);
                }
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.panel.set_shift(modifiers.state().shift_key());
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if self.panel.handle_key(&logical_key, &mut self.showcase) == PanelAction::Exit {
                    event_loop.exit();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = self.logical_cursor(position);
                self.on_cursor_moved(position);
            }
            WindowEvent::CursorLeft { .. } => {
                self.pointer.position = None;
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let pressed = state == ElementState::Pressed;
                match button {
                    MouseButton::Left => self.pointer.rotating = pressed,
                    MouseButton::Right | MouseButton::Middle => self.pointer.panning = pressed,
                    _ => {}
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
                };
                self.showcase.stage.queue_input(OrbitInput {
                    dolly: steps,
                    ..Default::default()
                });
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::io::FileFetcher;
    use crate::params::ParamValue;
    use crate::time::FrameClock;

    fn showcase() -> Showcase {
        let settings = ShowcaseSettings::default();
        let fetcher = Arc::new(FileFetcher::new(std::env::temp_dir().join("orbit-showcase-none")));
        Showcase::new(&settings, fetcher, FrameClock::monotonic()).unwrap()
    }

    #[test]
    fn tab_cycles_and_arrows_nudge_the_selected_binding() {
        let mut showcase = showcase();
        let mut panel = ControlPanel::default();

        panel.handle_key(&Key::Named(NamedKey::Tab), &mut showcase);
        assert_eq!(panel.selected(), 1);
        assert_eq!(showcase.params.names().nth(1), Some("lightIntensity"));

        let before = showcase.stage.light_intensity();
        let action = panel.handle_key(&Key::Named(NamedKey::ArrowUp), &mut showcase);
        assert_eq!(action, PanelAction::Changed);
        assert!((showcase.stage.light_intensity() - (before + 0.001)).abs() < 1e-5);

        panel.set_shift(true);
        panel.handle_key(&Key::Named(NamedKey::ArrowDown), &mut showcase);
        assert!((showcase.stage.light_intensity() - (before - 0.099)).abs() < 1e-4);

        panel.handle_key(&Key::Named(NamedKey::Tab), &mut showcase);
        assert_eq!(panel.selected(), 0);
    }

    struct BrokenRenderer;

    impl SceneRenderer for BrokenRenderer {
        fn render(&mut self, _: &crate::scene::SceneGraph, _: &crate::scene::Camera) -> Result<(), RenderError> {
            Err(RenderError::OutOfMemory)
        }
        fn set_viewport(&mut self, _: u32, _: u32) {}
        fn set_pixel_density(&mut self, _: f64) {}
    }

    #[test]
    fn halted_loop_stops_redrawing_without_exiting() {
        let mut showcase = showcase();
        showcase.start();
        let mut renderer = BrokenRenderer;

        let outcome = showcase.frame(&mut renderer);
        assert!(matches!(outcome, TickOutcome::Failed { halted: true, .. }));
        assert!(!schedules_next_frame(&outcome));

        // A redraw the platform asks for after the halt draws nothing and
        // schedules nothing.
        let late = showcase.frame(&mut renderer);
        assert_eq!(late, TickOutcome::Skipped);
        assert!(!schedules_next_frame(&late));
    }

    #[test]
    fn transient_failures_keep_scheduling() {
        let transient = TickOutcome::Failed {
            delta: 0.016,
            clamped: false,
            error: RenderError::SurfaceLost,
            halted: false,
        };
        assert!(schedules_next_frame(&transient));
        assert!(schedules_next_frame(&TickOutcome::Rendered {
            delta: 0.016,
            clamped: true
        }));
    }

    #[test]
    fn escape_exits_and_h_lists() {
        let mut showcase = showcase();
        let mut panel = ControlPanel::default();
        assert_eq!(
            panel.handle_key(&Key::Named(NamedKey::Escape), &mut showcase),
            PanelAction::Exit
        );
        assert_eq!(
            panel.handle_key(&Key::Character("h".into()), &mut showcase),
            PanelAction::Listed
        );
        assert_eq!(
            showcase.params.get("envMapIntensity", &showcase.stage),
            Ok(ParamValue::Scalar(0.4))
        );
    }
}

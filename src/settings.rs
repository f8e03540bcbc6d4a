use glam::Vec3;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::scene::controls::CameraBounds;

/// Everything that can be tuned from `showcase.json` without recompiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowcaseSettings {
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub assets: AssetSettings,
    #[serde(default)]
    pub render_loop: LoopSettings,
    #[serde(default = "ShowcaseSettings::default_env_map_intensity")]
    pub env_map_intensity: f32,
}

impl Default for ShowcaseSettings {
    fn default() -> Self {
        Self {
            render: RenderSettings::default(),
            camera: CameraSettings::default(),
            assets: AssetSettings::default(),
            render_loop: LoopSettings::default(),
            env_map_intensity: Self::default_env_map_intensity(),
        }
    }
}

impl ShowcaseSettings {
    pub fn load() -> Self {
        Self::load_from_path("showcase.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ShowcaseSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded showcase settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default settings.",
                        path, err
                    );
                    ShowcaseSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("Settings file {:?} not found. Using default settings.", path);
                ShowcaseSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default settings.",
                    path, err
                );
                ShowcaseSettings::default()
            }
        }
    }

    fn validate(mut self) -> Self {
        if self.render.sample_count == 0 || !self.render.sample_count.is_power_of_two() {
            warn!("Sample count must be a power of two. Using default instead.");
            self.render.sample_count = RenderSettings::default_sample_count();
        }

        if self.render.resolution.width == 0 || self.render.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.render.resolution = Resolution::default();
        }

        if !(self.render.max_pixel_ratio > 0.0) {
            warn!("Max pixel ratio must be positive. Using default value.");
            self.render.max_pixel_ratio = RenderSettings::default_max_pixel_ratio();
        }

        if !(self.camera.near > 0.0) || self.camera.far <= self.camera.near {
            warn!("Camera clip planes are invalid. Using default near/far.");
            self.camera.near = CameraSettings::default().near;
            self.camera.far = CameraSettings::default().far;
        }

        if !(0.0..=1.0).contains(&self.camera.damping_factor) {
            warn!("Damping factor must lie in [0, 1]. Using default value.");
            self.camera.damping_factor = CameraSettings::default().damping_factor;
        }

        if self.assets.loader_threads == 0 {
            warn!("Loader thread count must be greater than zero. Using default value.");
            self.assets.loader_threads = AssetSettings::default().loader_threads;
        }

        if self.render_loop.max_consecutive_failures == 0 {
            warn!("Render failure budget must be greater than zero. Using default value.");
            self.render_loop.max_consecutive_failures =
                LoopSettings::default().max_consecutive_failures;
        }

        if !(0.0..=4.0).contains(&self.env_map_intensity) {
            warn!("Environment intensity must lie in [0, 4]. Using default value.");
            self.env_map_intensity = Self::default_env_map_intensity();
        }

        self
    }

    const fn default_env_map_intensity() -> f32 {
        0.4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_sample_count")]
    pub sample_count: u32,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
    #[serde(default = "RenderSettings::default_max_pixel_ratio")]
    pub max_pixel_ratio: f64,
    #[serde(default = "RenderSettings::default_exposure")]
    pub exposure: f32,
    #[serde(default = "RenderSettings::default_clear_color")]
    pub clear_color: [f32; 3],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            sample_count: Self::default_sample_count(),
            resolution: Resolution::default(),
            present_mode: PresentModeSetting::default(),
            max_pixel_ratio: Self::default_max_pixel_ratio(),
            exposure: Self::default_exposure(),
            clear_color: Self::default_clear_color(),
        }
    }
}

impl RenderSettings {
    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }

    const fn default_sample_count() -> u32 {
        4
    }

    const fn default_max_pixel_ratio() -> f64 {
        2.0
    }

    const fn default_exposure() -> f32 {
        1.75
    }

    // #211d20
    const fn default_clear_color() -> [f32; 3] {
        [33.0 / 255.0, 29.0 / 255.0, 32.0 / 255.0]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    #[default]
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub start_position: [f32; 3],
    pub damping_factor: f32,
    pub min_height: f32,
    pub max_x: f32,
    pub max_z: f32,
}

impl CameraSettings {
    pub fn start_position(&self) -> Vec3 {
        Vec3::from_array(self.start_position)
    }

    pub fn bounds(&self) -> CameraBounds {
        CameraBounds {
            min_height: self.min_height,
            max_x: self.max_x,
            max_z: self.max_z,
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        let bounds = CameraBounds::default();
        Self {
            fov_y_degrees: 50.0,
            near: 0.1,
            far: 100.0,
            start_position: [-10.0, 6.0, 10.0],
            damping_factor: 0.05,
            min_height: bounds.min_height,
            max_x: bounds.max_x,
            max_z: bounds.max_z,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetSettings {
    pub root: String,
    pub loader_threads: usize,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            root: "static".to_string(),
            loader_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    /// Consecutive failed frames after which the renderer counts as unusable.
    pub max_consecutive_failures: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> ShowcaseSettings {
        let mut settings = ShowcaseSettings::default();
        settings.render.sample_count = 3;
        settings.render.resolution = Resolution {
            width: 0,
            height: 0,
        };
        settings.render.max_pixel_ratio = 0.0;
        settings.camera.near = 0.0;
        settings.camera.damping_factor = 2.0;
        settings.assets.loader_threads = 0;
        settings.render_loop.max_consecutive_failures = 0;
        settings.env_map_intensity = -1.0;
        settings
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = ShowcaseSettings::default();

        assert_eq!(validated.render.sample_count, defaults.render.sample_count);
        assert_eq!(validated.render.resolution.width, Resolution::default().width);
        assert_eq!(validated.render.max_pixel_ratio, 2.0);
        assert_eq!(validated.camera.near, defaults.camera.near);
        assert_eq!(validated.camera.far, defaults.camera.far);
        assert_eq!(validated.camera.damping_factor, defaults.camera.damping_factor);
        assert_eq!(validated.assets.loader_threads, defaults.assets.loader_threads);
        assert_eq!(
            validated.render_loop.max_consecutive_failures,
            defaults.render_loop.max_consecutive_failures
        );
        assert_eq!(validated.env_map_intensity, 0.4);
    }

    #[test]
    fn defaults_match_the_showcase_scene() {
        let settings = ShowcaseSettings::default();
        assert_eq!(settings.env_map_intensity, 0.4);
        assert_eq!(settings.camera.start_position(), Vec3::new(-10.0, 6.0, 10.0));
        let bounds = settings.camera.bounds();
        assert_eq!(bounds.min_height, 1.0);
        assert_eq!(bounds.max_x, 100.0);
        assert_eq!(bounds.max_z, 100.0);
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_sections() {
        let parsed: ShowcaseSettings =
            serde_json::from_str(r#"{ "camera": { "max_x": 20.0 } }"#).unwrap();
        assert_eq!(parsed.camera.max_x, 20.0);
        assert_eq!(parsed.camera.min_height, 1.0);
        assert_eq!(parsed.env_map_intensity, 0.4);
        assert_eq!(parsed.render.exposure, 1.75);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = ShowcaseSettings::load_from_path("definitely/not/here.json");
        assert_eq!(settings.assets.root, "static");
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];

        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn present_mode_uses_first_available_when_fifo_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Immediate];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Immediate
        );
    }
}

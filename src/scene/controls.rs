// scene/controls.rs
// Damped orbit controls around a target point, plus the positional clamp
// applied after every control update.

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use super::camera::Camera;

const EPS: f32 = 1e-6;

/// Pointer input accumulated since the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrbitInput {
    /// Drag in logical pixels, the same units as the viewport height.
    pub rotate: Vec2,
    pub pan: Vec2,
    /// Wheel steps; positive moves towards the target.
    pub dolly: f32,
}

impl OrbitInput {
    pub fn is_empty(&self) -> bool {
        self.rotate == Vec2::ZERO && self.pan == Vec2::ZERO && self.dolly == 0.0
    }
}

#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    /// Height of the viewport in pixels; drag distances are relative to it.
    pub viewport_height: f32,

    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    pan_offset: Vec3,
}

impl OrbitControls {
    pub fn new(target: Vec3) -> Self {
        Self {
            target,
            enable_damping: true,
            damping_factor: 0.05,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            viewport_height: 720.0,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
        }
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.delta_theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.delta_phi -= angle;
    }

    pub fn dolly_in(&mut self, factor: f32) {
        self.scale *= factor;
    }

    pub fn dolly_out(&mut self, factor: f32) {
        self.scale /= factor;
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    /// Queues motion from pointer input. Nothing moves until [`update`](Self::update).
    pub fn handle_input(&mut self, input: &OrbitInput, camera: &Camera) {
        let height = self.viewport_height.max(1.0);

        if input.rotate != Vec2::ZERO {
            let delta = input.rotate * self.rotate_speed;
            self.rotate_left(2.0 * PI * delta.x / height);
            self.rotate_up(2.0 * PI * delta.y / height);
        }

        if input.dolly != 0.0 {
            let factor = self.zoom_scale().powf(input.dolly.abs());
            if input.dolly > 0.0 {
                self.dolly_in(factor);
            } else {
                self.dolly_out(factor);
            }
        }

        if input.pan != Vec2::ZERO {
            let offset = camera.eye - self.target;
            let target_distance = offset.length() * (camera.fov_y_radians * 0.5).tan();
            let forward = (self.target - camera.eye).normalize_or_zero();
            let right = forward.cross(camera.up).normalize_or_zero();
            let up = right.cross(forward);
            let delta = input.pan * self.pan_speed;
            self.pan_offset += right * (-2.0 * delta.x * target_distance / height);
            self.pan_offset += up * (2.0 * delta.y * target_distance / height);
        }
    }

    /// Applies queued motion to `camera`. Deterministic for a given state and
    /// camera; with damping the queued motion decays over following calls.
    /// Returns true if the camera moved.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        let previous_eye = camera.eye;
        let previous_target = camera.target;

        let offset = camera.eye - self.target;
        let mut radius = offset.length();
        let (mut theta, mut phi) = if radius < EPS {
            (0.0, PI * 0.5)
        } else {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        };

        if self.enable_damping {
            theta += self.delta_theta * self.damping_factor;
            phi += self.delta_phi * self.damping_factor;
        } else {
            theta += self.delta_theta;
            phi += self.delta_phi;
        }

        phi = phi
            .clamp(self.min_polar_angle, self.max_polar_angle)
            .clamp(EPS, PI - EPS);

        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);

        if self.enable_damping {
            self.target += self.pan_offset * self.damping_factor;
        } else {
            self.target += self.pan_offset;
        }

        let sin_phi = phi.sin();
        let offset = Vec3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );

        camera.eye = self.target + offset;
        camera.target = self.target;

        if self.enable_damping {
            let decay = 1.0 - self.damping_factor;
            self.delta_theta *= decay;
            self.delta_phi *= decay;
            self.pan_offset *= decay;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;

        camera.eye.distance_squared(previous_eye) > EPS
            || camera.target.distance_squared(previous_target) > EPS
    }
}

/// Keeps the camera above the floor and inside the scene extents. Only the
/// upper X and Z limits are enforced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBounds {
    pub min_height: f32,
    pub max_x: f32,
    pub max_z: f32,
}

impl Default for CameraBounds {
    fn default() -> Self {
        Self {
            min_height: 1.0,
            max_x: 100.0,
            max_z: 100.0,
        }
    }
}

impl CameraBounds {
    pub fn clamp(&self, position: Vec3) -> Vec3 {
        Vec3::new(
            position.x.min(self.max_x),
            position.y.max(self.min_height),
            position.z.min(self.max_z),
        )
    }

    /// Returns true if the camera had to be moved.
    pub fn apply(&self, camera: &mut Camera) -> bool {
        let clamped = self.clamp(camera.eye);
        let moved = clamped != camera.eye;
        camera.eye = clamped;
        moved
    }
}

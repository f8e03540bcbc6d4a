use glam::{Quat, Vec3};
use hecs::{Entity, World};

use super::components::TransformComponent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationInterpolation {
    Step,
    Linear,
}

#[derive(Debug, Clone)]
pub enum AnimationOutput {
    Vec3(Vec<Vec3>),
    Quat(Vec<Quat>),
}

#[derive(Debug, Clone)]
pub struct AnimationSampler {
    pub times: Vec<f32>,
    pub output: AnimationOutput,
    pub interpolation: AnimationInterpolation,
}

impl AnimationSampler {
    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    fn sample_indices(&self, time: f32) -> Option<(usize, usize, f32)> {
        if self.times.is_empty() {
            return None;
        }

        if self.times.len() == 1 {
            return Some((0, 0, 0.0));
        }

        let first = self.times[0];
        if time <= first {
            return Some((0, 0, 0.0));
        }

        let last_index = self.times.len() - 1;
        let last = self.times[last_index];
        if time >= last {
            return Some((last_index, last_index, 0.0));
        }

        match self.times.binary_search_by(|t| t.total_cmp(&time)) {
            Ok(index) => Some((index, index, 0.0)),
            Err(upper) => {
                if upper == 0 || upper >= self.times.len() {
                    return None;
                }
                let lower = upper - 1;
                let start = self.times[lower];
                let end = self.times[upper];
                let span = end - start;
                let factor = if span.abs() < f32::EPSILON {
                    0.0
                } else {
                    ((time - start) / span).clamp(0.0, 1.0)
                };
                Some((lower, upper, factor))
            }
        }
    }

    pub fn sample_vec3(&self, time: f32) -> Option<Vec3> {
        let values = match &self.output {
            AnimationOutput::Vec3(values) => values,
            _ => return None,
        };

        let (lower, upper, factor) = self.sample_indices(time)?;

        if lower == upper || matches!(self.interpolation, AnimationInterpolation::Step) {
            return values.get(lower).copied();
        }

        Some(values.get(lower)?.lerp(*values.get(upper)?, factor))
    }

    pub fn sample_quat(&self, time: f32) -> Option<Quat> {
        let values = match &self.output {
            AnimationOutput::Quat(values) => values,
            _ => return None,
        };

        let (lower, upper, factor) = self.sample_indices(time)?;

        if lower == upper || matches!(self.interpolation, AnimationInterpolation::Step) {
            return values.get(lower).copied();
        }

        let a = values.get(lower)?.normalize();
        let b = values.get(upper)?.normalize();
        Some(a.slerp(b, factor).normalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformProperty {
    Translation,
    Rotation,
    Scale,
}

#[derive(Debug, Clone)]
pub struct AnimationChannel {
    pub sampler: AnimationSampler,
    pub entity: Entity,
    pub property: TransformProperty,
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<AnimationChannel>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration: 0.0,
            channels: Vec::new(),
        }
    }

    pub fn add_channel(&mut self, channel: AnimationChannel) {
        self.duration = self.duration.max(channel.sampler.end_time());
        self.channels.push(channel);
    }

    /// Writes the pose at `time` into the targeted entities' local transforms.
    /// Channels whose entity has no transform are ignored.
    pub fn apply(&self, time: f32, world: &World) {
        for channel in &self.channels {
            let Ok(mut transform) = world.get::<&mut TransformComponent>(channel.entity) else {
                continue;
            };
            match channel.property {
                TransformProperty::Translation => {
                    if let Some(value) = channel.sampler.sample_vec3(time) {
                        transform.0.translation = value;
                    }
                }
                TransformProperty::Rotation => {
                    if let Some(value) = channel.sampler.sample_quat(time) {
                        transform.0.rotation = value;
                    }
                }
                TransformProperty::Scale => {
                    if let Some(value) = channel.sampler.sample_vec3(time) {
                        transform.0.scale = value;
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnimationState {
    pub clip_index: usize,
    pub time: f32,
    pub speed: f32,
    pub looping: bool,
    pub playing: bool,
}

impl AnimationState {
    pub fn new(clip_index: usize) -> Self {
        Self {
            clip_index,
            time: 0.0,
            speed: 1.0,
            looping: true,
            playing: true,
        }
    }

    pub fn advance(&mut self, dt: f32, duration: f32) -> f32 {
        if !self.playing {
            return self.time;
        }

        let mut time = self.time + dt * self.speed;
        let duration = duration.max(0.0);

        if duration > 0.0 {
            if self.looping {
                time = time.rem_euclid(duration);
            } else if time >= duration {
                time = duration;
                self.playing = false;
            } else if time < 0.0 {
                time = 0.0;
            }
        }

        self.time = time;
        time
    }
}

/// Playback for one loaded model: its clips and the single active state.
#[derive(Debug, Clone)]
pub struct AnimationMixer {
    pub root: Entity,
    pub clips: Vec<AnimationClip>,
    state: Option<AnimationState>,
}

impl AnimationMixer {
    pub fn new(root: Entity, clips: Vec<AnimationClip>) -> Self {
        Self {
            root,
            clips,
            state: None,
        }
    }

    /// Starts `clip_index` from time zero. Returns false if there is no such clip.
    pub fn play(&mut self, clip_index: usize) -> bool {
        if clip_index >= self.clips.len() {
            log::warn!(
                "Mixer has {} clips, cannot play clip {}",
                self.clips.len(),
                clip_index
            );
            return false;
        }
        self.state = Some(AnimationState::new(clip_index));
        true
    }

    pub fn active_clip(&self) -> Option<&AnimationClip> {
        self.state
            .as_ref()
            .and_then(|state| self.clips.get(state.clip_index))
    }

    pub fn active_index(&self) -> Option<usize> {
        self.state.as_ref().map(|state| state.clip_index)
    }

    pub fn time(&self) -> f32 {
        self.state.as_ref().map_or(0.0, |state| state.time)
    }

    /// Advances the active clip and poses its targets. Negative deltas are
    /// ignored so playback never runs backward.
    pub fn advance(&mut self, delta: f32, world: &World) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let Some(clip) = self.clips.get(state.clip_index) else {
            return;
        };
        let time = state.advance(delta.max(0.0), clip.duration);
        clip.apply(time, world);
    }
}

#[derive(Debug, Default)]
pub struct MixerSet {
    mixers: Vec<AnimationMixer>,
}

impl MixerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mixer: AnimationMixer) -> usize {
        self.mixers.push(mixer);
        self.mixers.len() - 1
    }

    pub fn advance(&mut self, delta: f32, world: &World) {
        for mixer in &mut self.mixers {
            mixer.advance(delta, world);
        }
    }

    pub fn get(&self, index: usize) -> Option<&AnimationMixer> {
        self.mixers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnimationMixer> {
        self.mixers.iter()
    }

    pub fn len(&self) -> usize {
        self.mixers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transform;
    use glam::vec3;

    fn translation_clip(entity: Entity, end: f32) -> AnimationClip {
        let mut clip = AnimationClip::new("move");
        clip.add_channel(AnimationChannel {
            sampler: AnimationSampler {
                times: vec![0.0, end],
                output: AnimationOutput::Vec3(vec![Vec3::ZERO, Vec3::new(end, 0.0, 0.0)]),
                interpolation: AnimationInterpolation::Linear,
            },
            entity,
            property: TransformProperty::Translation,
        });
        clip
    }

    #[test]
    fn sampler_vec3_linear_interpolation() {
        let sampler = AnimationSampler {
            times: vec![0.0, 1.0],
            output: AnimationOutput::Vec3(vec![Vec3::ZERO, Vec3::ONE]),
            interpolation: AnimationInterpolation::Linear,
        };

        assert_eq!(sampler.sample_vec3(-0.5).unwrap(), Vec3::ZERO);
        assert_eq!(sampler.sample_vec3(0.0).unwrap(), Vec3::ZERO);
        assert_eq!(sampler.sample_vec3(1.0).unwrap(), Vec3::ONE);

        let mid = sampler.sample_vec3(0.5).unwrap();
        assert!((mid - vec3(0.5, 0.5, 0.5)).length() < 1e-6);
    }

    #[test]
    fn sampler_quat_spherical_interpolation() {
        let sampler = AnimationSampler {
            times: vec![0.0, 1.0],
            output: AnimationOutput::Quat(vec![
                Quat::IDENTITY,
                Quat::from_rotation_y(std::f32::consts::PI),
            ]),
            interpolation: AnimationInterpolation::Linear,
        };

        let half = sampler.sample_quat(0.5).unwrap();
        let rotated_half = (half * Vec3::Z).normalize();
        assert!(rotated_half.z.abs() < 1e-4, "unexpected slerp result: {:?}", half);
        assert!((rotated_half.x.abs() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn sampler_step_mode_picks_exact_key() {
        let sampler = AnimationSampler {
            times: vec![0.0, 1.0, 2.0],
            output: AnimationOutput::Vec3(vec![Vec3::X, Vec3::Y, Vec3::Z]),
            interpolation: AnimationInterpolation::Step,
        };

        assert_eq!(sampler.sample_vec3(0.1).unwrap(), Vec3::X);
        assert_eq!(sampler.sample_vec3(1.5).unwrap(), Vec3::Y);
        assert_eq!(sampler.sample_vec3(2.0).unwrap(), Vec3::Z);
    }

    #[test]
    fn animation_state_looping_and_clamp_behaviour() {
        let mut looping = AnimationState::new(0);
        looping.time = 1.5;
        let advanced = looping.advance(1.0, 2.0);
        assert!((advanced - 0.5).abs() < 1e-6);
        assert!(looping.playing);

        let mut once = AnimationState::new(0);
        once.looping = false;
        let advanced = once.advance(5.0, 2.0);
        assert!((advanced - 2.0).abs() < 1e-6);
        assert!(!once.playing);
        let advanced = once.advance(1.0, 2.0);
        assert!((advanced - 2.0).abs() < 1e-6);
    }

    #[test]
    fn mixer_poses_targets_and_wraps() {
        let mut world = World::new();
        let entity = world.spawn((TransformComponent(Transform::IDENTITY),));
        let mut mixer = AnimationMixer::new(entity, vec![translation_clip(entity, 2.0)]);
        assert!(mixer.play(0));
        assert!(!mixer.play(5));

        mixer.advance(0.5, &world);
        assert!((mixer.time() - 0.5).abs() < 1e-6);
        let pose = world.get::<&TransformComponent>(entity).unwrap().0;
        assert!((pose.translation.x - 0.5).abs() < 1e-6);

        mixer.advance(2.0, &world);
        assert!((mixer.time() - 0.5).abs() < 1e-5);

        mixer.advance(-1.0, &world);
        assert!((mixer.time() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn mixer_without_active_clip_is_inert() {
        let mut world = World::new();
        let entity = world.spawn((TransformComponent(Transform::IDENTITY),));
        let mut set = MixerSet::new();
        set.add(AnimationMixer::new(entity, vec![translation_clip(entity, 1.0)]));
        set.advance(0.25, &world);
        assert_eq!(set.get(0).unwrap().time(), 0.0);
        assert_eq!(world.get::<&TransformComponent>(entity).unwrap().0, Transform::IDENTITY);
    }
}

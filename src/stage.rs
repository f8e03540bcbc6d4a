// stage.rs
// Everything a frame reads and a load continuation may write: the scene
// graph, global parameters, animation mixers and the camera rig. Only the
// main thread owns a Stage.

use glam::Vec3;
use hecs::Entity;

use crate::asset::ModelData;
use crate::scene::{
    normalize, AnimationMixer, Camera, CameraBounds, DirectionalLight, GlobalParams, MixerSet,
    ModelInstance, NormalizeReport, OrbitControls, OrbitInput, SceneGraph, SceneNode, Transform,
};
use crate::settings::CameraSettings;

pub struct Stage {
    pub graph: SceneGraph,
    pub params: GlobalParams,
    pub mixers: MixerSet,
    pub camera: Camera,
    pub controls: OrbitControls,
    pub bounds: CameraBounds,
    light: Option<Entity>,
    input: OrbitInput,
}

impl Stage {
    pub fn new(settings: &CameraSettings, params: GlobalParams) -> Self {
        let mut camera = Camera::perspective(
            settings.fov_y_degrees,
            16.0 / 9.0,
            settings.near,
            settings.far,
        );
        camera.eye = settings.start_position();
        camera.target = Vec3::ZERO;

        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.damping_factor = settings.damping_factor;

        Self {
            graph: SceneGraph::new(),
            params,
            mixers: MixerSet::new(),
            camera,
            controls,
            bounds: settings.bounds(),
            light: None,
            input: OrbitInput::default(),
        }
    }

    /// Adds the scene's directional light. A second call replaces the first.
    pub fn set_light(&mut self, light: DirectionalLight, position: Vec3) -> Entity {
        if let Some(previous) = self.light.take() {
            self.graph.remove_subtree(previous);
        }
        let entity = self.graph.insert(
            SceneNode::light("directionalLight", light)
                .with_transform(Transform::from_translation(position)),
        );
        self.light = Some(entity);
        entity
    }

    pub fn light(&self) -> Option<Entity> {
        self.light
    }

    pub fn light_intensity(&self) -> f32 {
        self.light
            .and_then(|entity| self.graph.world.get::<&DirectionalLight>(entity).ok().map(|l| l.intensity))
            .unwrap_or(0.0)
    }

    pub fn set_light_intensity(&mut self, intensity: f32) {
        if let Some(mut light) = self.light.and_then(|entity| self.graph.light_mut(entity)) {
            light.intensity = intensity;
        }
    }

    pub fn light_position(&self) -> Vec3 {
        self.light
            .and_then(|entity| self.graph.local_transform(entity))
            .map(|t| t.translation)
            .unwrap_or(Vec3::ZERO)
    }

    pub fn set_light_position(&mut self, position: Vec3) {
        let Some(entity) = self.light else {
            return;
        };
        if let Some(mut transform) = self.graph.local_transform(entity) {
            transform.translation = position;
            self.graph.set_local_transform(entity, transform);
        }
    }

    pub fn set_env_map_intensity(&mut self, intensity: f32) {
        self.params.env_map_intensity = intensity;
    }

    pub fn normalize(&mut self) -> NormalizeReport {
        normalize(&mut self.graph, &self.params)
    }

    /// Inserts `model` under the root and re-establishes the material
    /// invariants for the new nodes.
    pub fn insert_model(&mut self, model: &ModelData, name: &str, transform: Transform) -> ModelInstance {
        let instance = self.graph.instantiate_model(model, name, transform);
        self.normalize();
        instance
    }

    /// Registers a mixer for an inserted model and starts `clip`. Returns the
    /// mixer index, or None if the model has no such clip.
    pub fn play(&mut self, instance: &ModelInstance, clip: usize) -> Option<usize> {
        let mut mixer = AnimationMixer::new(instance.root, instance.clips.clone());
        mixer.play(clip).then(|| self.mixers.add(mixer))
    }

    /// Accumulates pointer input until the next control update.
    pub fn queue_input(&mut self, input: OrbitInput) {
        self.input.rotate += input.rotate;
        self.input.pan += input.pan;
        self.input.dolly += input.dolly;
    }

    /// Feeds queued input to the orbit controls and steps them once.
    pub fn update_controls(&mut self) -> bool {
        let input = std::mem::take(&mut self.input);
        if !input.is_empty() {
            self.controls.handle_input(&input, &self.camera);
        }
        self.controls.update(&mut self.camera)
    }

    pub fn advance_animations(&mut self, delta: f32) {
        self.mixers.advance(delta, &self.graph.world);
        self.graph.propagate_transforms();
    }

    pub fn apply_bounds(&mut self) -> bool {
        self.bounds.apply(&mut self.camera)
    }

    /// Camera aspect follows the viewport; drag speed is relative to its height.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_viewport(width, height);
        if height > 0 {
            self.controls.viewport_height = height as f32;
        }
    }
}

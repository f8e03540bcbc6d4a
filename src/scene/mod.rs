// scene/mod.rs

pub mod animation;
pub mod assembly;
pub mod camera;
pub mod components;
pub mod controls;
pub mod graph;
pub mod material;
pub mod normalize;
pub mod transform;

pub use animation::{AnimationClip, AnimationMixer, MixerSet};
pub use assembly::{AssemblyStats, SceneAssembler};
pub use camera::Camera;
pub use controls::{CameraBounds, OrbitControls, OrbitInput};
pub use graph::{Drawable, LightView, ModelInstance, SceneGraph, SceneNode};
pub use material::{Material, MaterialFlags, MaterialKind};
pub use normalize::{normalize, GlobalParams, NormalizeReport};
pub use transform::Transform;

// Re-export all components
pub use components::{
    Children, DirectionalLight, MaterialComponent, MeshComponent, Name, Parent, ShadowConfig,
    ShadowFlags, TransformComponent, WorldTransform,
};

// scene/components.rs
// Pure hecs components - no custom entity system

use bitflags::bitflags;
use glam::Vec3;

use crate::asset::{Handle, MeshData};
use crate::scene::{Material, Transform};

// ============================================================================
// Core Rendering Components
// ============================================================================

/// Parent-relative transform (position, rotation, scale)
#[derive(Debug, Clone, Copy)]
pub struct TransformComponent(pub Transform);

/// World-space transform (computed from hierarchy)
#[derive(Debug, Clone, Copy)]
pub struct WorldTransform(pub Transform);

#[derive(Debug, Clone, Copy)]
pub struct MeshComponent(pub Handle<MeshData>);

/// Shared material reference
#[derive(Debug, Clone, Copy)]
pub struct MaterialComponent(pub Handle<Material>);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShadowFlags: u8 {
        const CAST = 1 << 0;
        const RECEIVE = 1 << 1;
    }
}

// ============================================================================
// Lighting Components
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowConfig {
    /// Far plane of the orthographic shadow camera.
    pub far: f32,
    pub map_size: u32,
    pub normal_bias: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            far: 15.0,
            map_size: 1024,
            normal_bias: 0.05,
        }
    }
}

/// Directional light shining from its world position towards the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub cast_shadow: bool,
    pub shadow: ShadowConfig,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            cast_shadow: false,
            shadow: ShadowConfig::default(),
        }
    }
}

// ============================================================================
// Utility Components
// ============================================================================

/// Name component for lookups and logs
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

// ============================================================================
// Hierarchy Components
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Parent(pub hecs::Entity);

#[derive(Debug, Clone, Default)]
pub struct Children(pub Vec<hecs::Entity>);

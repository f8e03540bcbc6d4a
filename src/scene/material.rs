// scene/material.rs

use bitflags::bitflags;
use glam::Vec4;

use crate::asset::{Handle, TextureData};

bitflags! {
    /// Capabilities the normalization pass and renderer key off.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u32 {
        /// Shaded by the scene environment; receives the global intensity.
        const ENVIRONMENT_REACTIVE = 1 << 0;
        const DOUBLE_SIDED = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterialKind {
    /// Metallic-roughness shading lit by the directional light and environment.
    Standard {
        base_color: Vec4,
        metallic: f32,
        roughness: f32,
        base_color_texture: Option<Handle<TextureData>>,
        /// Tangent-space normal map, sampled with the same UV repeat.
        normal_texture: Option<Handle<TextureData>>,
        uv_repeat: f32,
    },
    /// Lighting baked into a spherical texture looked up by view-space normal.
    Matcap { matcap: Option<Handle<TextureData>> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub env_map_intensity: f32,
    pub flags: MaterialFlags,
    /// Bumped on every change the renderer must re-upload.
    pub revision: u64,
}

impl Material {
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MaterialKind::Standard {
                base_color: Vec4::ONE,
                metallic: 0.0,
                roughness: 1.0,
                base_color_texture: None,
                normal_texture: None,
                uv_repeat: 1.0,
            },
            env_map_intensity: 1.0,
            flags: MaterialFlags::ENVIRONMENT_REACTIVE,
            revision: 0,
        }
    }

    pub fn matcap(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MaterialKind::Matcap { matcap: None },
            env_map_intensity: 0.0,
            flags: MaterialFlags::empty(),
            revision: 0,
        }
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        if let MaterialKind::Standard { base_color, .. } = &mut self.kind {
            *base_color = color;
        }
        self
    }

    pub fn with_metallic_roughness(mut self, metallic: f32, roughness: f32) -> Self {
        if let MaterialKind::Standard {
            metallic: m,
            roughness: r,
            ..
        } = &mut self.kind
        {
            *m = metallic.clamp(0.0, 1.0);
            *r = roughness.clamp(0.0, 1.0);
        }
        self
    }

    pub fn with_texture(mut self, texture: Handle<TextureData>, repeat: f32) -> Self {
        match &mut self.kind {
            MaterialKind::Standard {
                base_color_texture,
                uv_repeat,
                ..
            } => {
                *base_color_texture = Some(texture);
                *uv_repeat = repeat;
            }
            MaterialKind::Matcap { matcap } => *matcap = Some(texture),
        }
        self
    }

    /// UV tiling for a texture that arrives later. Ignored for matcaps.
    pub fn with_uv_repeat(mut self, repeat: f32) -> Self {
        if let MaterialKind::Standard { uv_repeat, .. } = &mut self.kind {
            *uv_repeat = repeat;
        }
        self
    }

    /// Swaps in a texture after creation and marks the material dirty.
    pub fn set_texture(&mut self, texture: Handle<TextureData>) {
        match &mut self.kind {
            MaterialKind::Standard {
                base_color_texture, ..
            } => *base_color_texture = Some(texture),
            MaterialKind::Matcap { matcap } => *matcap = Some(texture),
        }
        self.mark_dirty();
    }

    /// Attaches a normal map. Matcaps have no use for one and ignore it.
    pub fn set_normal_texture(&mut self, texture: Handle<TextureData>) {
        if let MaterialKind::Standard { normal_texture, .. } = &mut self.kind {
            *normal_texture = Some(texture);
            self.mark_dirty();
        }
    }

    pub fn is_environment_reactive(&self) -> bool {
        self.flags.contains(MaterialFlags::ENVIRONMENT_REACTIVE)
    }

    pub fn mark_dirty(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_materials_are_environment_reactive() {
        assert!(Material::standard("floor").is_environment_reactive());
        assert!(!Material::matcap("text").is_environment_reactive());
    }

    #[test]
    fn setting_a_texture_bumps_the_revision() {
        let mut material = Material::matcap("text");
        material.set_texture(Handle::new(3));
        assert_eq!(material.revision, 1);
        assert_eq!(
            material.kind,
            MaterialKind::Matcap {
                matcap: Some(Handle::new(3))
            }
        );
    }

    #[test]
    fn normal_maps_attach_to_standard_materials_only() {
        let mut floor = Material::standard("floor");
        floor.set_normal_texture(Handle::new(7));
        assert_eq!(floor.revision, 1);
        assert!(matches!(
            floor.kind,
            MaterialKind::Standard { normal_texture: Some(h), base_color_texture: None, .. } if h == Handle::new(7)
        ));

        let mut text = Material::matcap("text");
        text.set_normal_texture(Handle::new(7));
        assert_eq!(text.revision, 0);
    }
}

// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::scene::{Camera, LightView, Material, MaterialKind, ShadowConfig, ShadowFlags};

/// Half-width of the orthographic volume the directional shadow covers.
pub const SHADOW_HALF_EXTENT: f32 = 5.0;
const SHADOW_NEAR: f32 = 0.5;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct FrameUniform {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    /// xyz eye, w exposure.
    pub camera_pos: [f32; 4],
    /// xyz direction towards the light, w intensity.
    pub light_dir: [f32; 4],
    /// rgb colour, w 1.0 when the light casts shadows.
    pub light_color: [f32; 4],
    /// rgb mean environment radiance, w 1.0 when an environment is bound.
    pub ambient: [f32; 4],
    /// x normal bias, y shadow texel size.
    pub shadow: [f32; 4],
}

impl FrameUniform {
    pub fn new(camera: &Camera, light: Option<&LightView>, ambient: Option<Vec3>, exposure: f32) -> Self {
        let (light_view_proj, light_dir, light_color, shadow) = match light {
            Some(view) => {
                let dir = view.position.normalize_or(Vec3::Y);
                let casts = if view.light.cast_shadow { 1.0 } else { 0.0 };
                (
                    light_view_proj(view.position, &view.light.shadow),
                    dir.extend(view.light.intensity),
                    view.light.color.extend(casts),
                    [
                        view.light.shadow.normal_bias,
                        1.0 / view.light.shadow.map_size.max(1) as f32,
                        0.0,
                        0.0,
                    ],
                )
            }
            None => (Mat4::IDENTITY, Vec3::Y.extend(0.0), Vec3::ZERO.extend(0.0), [0.0; 4]),
        };

        let (ambient_rgb, has_env) = match ambient {
            Some(radiance) => (radiance, 1.0),
            None => (Vec3::ZERO, 0.0),
        };

        Self {
            view_proj: camera.view_proj().to_cols_array_2d(),
            view: camera.view().to_cols_array_2d(),
            light_view_proj: light_view_proj.to_cols_array_2d(),
            camera_pos: camera.eye.extend(exposure).to_array(),
            light_dir: light_dir.to_array(),
            light_color: light_color.to_array(),
            ambient: ambient_rgb.extend(has_env).to_array(),
            shadow,
        }
    }
}

/// One entry of the per-frame object storage buffer, indexed by instance.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ObjectData {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    /// x: 1 if the object receives shadows.
    pub flags: [u32; 4],
}

impl ObjectData {
    pub fn new(model: Mat4, shadows: ShadowFlags) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
            flags: [shadows.contains(ShadowFlags::RECEIVE) as u32, 0, 0, 0],
        }
    }
}

pub const SHADING_STANDARD: u32 = 0;
pub const SHADING_MATCAP: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    /// metallic, roughness, environment intensity, uv repeat.
    pub params: [f32; 4],
    /// x shading model, y 1 if a texture is bound, z 1 if a normal map is bound.
    pub mode: [u32; 4],
}

impl MaterialUniform {
    pub fn from_material(material: &Material) -> Self {
        match &material.kind {
            MaterialKind::Standard {
                base_color,
                metallic,
                roughness,
                base_color_texture,
                normal_texture,
                uv_repeat,
            } => Self {
                base_color: base_color.to_array(),
                params: [*metallic, *roughness, material.env_map_intensity, *uv_repeat],
                mode: [
                    SHADING_STANDARD,
                    base_color_texture.is_some() as u32,
                    normal_texture.is_some() as u32,
                    0,
                ],
            },
            MaterialKind::Matcap { matcap } => Self {
                base_color: [1.0; 4],
                params: [0.0, 1.0, material.env_map_intensity, 1.0],
                mode: [SHADING_MATCAP, matcap.is_some() as u32, 0, 0],
            },
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ShadowViewUniform {
    pub view_proj: [[f32; 4]; 4],
}

/// Orthographic light-space transform for a directional light at `position`
/// aimed at the origin. Depth spans the light's shadow far plane.
pub fn light_view_proj(position: Vec3, shadow: &ShadowConfig) -> Mat4 {
    let up = if position.normalize_or(Vec3::Y).abs_diff_eq(Vec3::Y, 1e-3)
        || position.normalize_or(Vec3::Y).abs_diff_eq(Vec3::NEG_Y, 1e-3)
    {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(position, Vec3::ZERO, up);
    let proj = Mat4::orthographic_rh(
        -SHADOW_HALF_EXTENT,
        SHADOW_HALF_EXTENT,
        -SHADOW_HALF_EXTENT,
        SHADOW_HALF_EXTENT,
        SHADOW_NEAR,
        shadow.far.max(SHADOW_NEAR + 0.01),
    );
    proj * view
}

/// sRGB-encoded colour component to linear, for the clear colour.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

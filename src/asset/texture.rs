use glam::Vec3;

use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Clamp,
    Repeat,
}

/// Decoded RGBA8 image ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub srgb: bool,
    pub wrap: WrapMode,
}

impl TextureData {
    pub fn decode(label: &str, bytes: &[u8]) -> Result<Self, LoadError> {
        let image = image::load_from_memory(bytes).map_err(|err| LoadError::decode(label, err))?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            label: label.to_string(),
            width,
            height,
            pixels: rgba.into_raw(),
            srgb: true,
            wrap: WrapMode::Clamp,
        })
    }

    pub fn solid(label: &str, rgba: [u8; 4]) -> Self {
        Self {
            label: label.to_string(),
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
            srgb: true,
            wrap: WrapMode::Clamp,
        }
    }

    /// Marks the texture as data (normal maps and the like).
    pub fn linear(mut self) -> Self {
        self.srgb = false;
        self
    }

    pub fn repeating(mut self) -> Self {
        self.wrap = WrapMode::Repeat;
        self
    }
}

/// Six square faces in `+X, -X, +Y, -Y, +Z, -Z` order.
#[derive(Debug, Clone, PartialEq)]
pub struct CubemapData {
    pub label: String,
    pub size: u32,
    pub faces: [Vec<u8>; 6],
    /// Average linear radiance over all faces, used for ambient light.
    pub mean_radiance: Vec3,
}

pub const CUBE_FACE_NAMES: [&str; 6] = ["px", "nx", "py", "ny", "pz", "nz"];

impl CubemapData {
    pub fn from_faces(label: &str, faces: Vec<TextureData>) -> Result<Self, LoadError> {
        let faces: [TextureData; 6] = faces.try_into().map_err(|faces: Vec<TextureData>| {
            LoadError::decode(label, format!("expected 6 cubemap faces, got {}", faces.len()))
        })?;

        let size = faces[0].width;
        for face in &faces {
            if face.width != face.height || face.width != size {
                return Err(LoadError::decode(
                    label,
                    format!(
                        "cubemap face {} is {}x{}, expected {}x{}",
                        face.label, face.width, face.height, size, size
                    ),
                ));
            }
        }

        let mean_radiance = mean_linear_color(&faces);
        Ok(Self {
            label: label.to_string(),
            size,
            faces: faces.map(|face| face.pixels),
            mean_radiance,
        })
    }
}

fn srgb_to_linear(value: u8) -> f32 {
    let c = value as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn mean_linear_color(faces: &[TextureData]) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0usize;
    for face in faces {
        for px in face.pixels.chunks_exact(4) {
            sum += Vec3::new(
                srgb_to_linear(px[0]),
                srgb_to_linear(px[1]),
                srgb_to_linear(px[2]),
            );
            count += 1;
        }
    }
    if count == 0 {
        Vec3::ZERO
    } else {
        sum / count as f32
    }
}

// asset/model.rs
// glTF / GLB import into plain data. Nothing here touches the scene graph; the
// assembly continuation instantiates a `ModelData` into entities.

use glam::{Quat, Vec3, Vec4};
use serde_json::Value;

use super::mesh::MeshData;
use super::texture::TextureData;
use crate::error::LoadError;
use crate::io::{sibling_source, AssetFetcher};
use crate::scene::animation::{
    AnimationInterpolation, AnimationOutput, AnimationSampler, TransformProperty,
};
use crate::scene::Transform;

const DRACO: &str = "KHR_draco_mesh_compression";
const UNSUPPORTED_EXTENSIONS: &[&str] = &[DRACO, "EXT_meshopt_compression"];

#[derive(Debug, Clone)]
pub struct ModelNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ModelPrimitive {
    pub mesh: MeshData,
    pub material: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct MaterialDesc {
    pub name: String,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub base_color_texture: Option<TextureData>,
    pub normal_texture: Option<TextureData>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: Vec4::ONE,
            metallic: 1.0,
            roughness: 1.0,
            base_color_texture: None,
            normal_texture: None,
        }
    }
}

/// Channel addressed by node index; resolved to an entity on instantiation.
#[derive(Debug, Clone)]
pub struct ChannelDesc {
    pub node: usize,
    pub property: TransformProperty,
    pub sampler: AnimationSampler,
}

#[derive(Debug, Clone)]
pub struct ClipDesc {
    pub name: String,
    pub channels: Vec<ChannelDesc>,
}

#[derive(Debug, Clone)]
pub struct ModelData {
    pub label: String,
    pub nodes: Vec<ModelNode>,
    pub roots: Vec<usize>,
    pub meshes: Vec<Vec<ModelPrimitive>>,
    pub materials: Vec<MaterialDesc>,
    pub animations: Vec<ClipDesc>,
}

impl ModelData {
    /// Parses a `.gltf` or `.glb`. External buffers and images are fetched
    /// relative to `source`.
    pub fn parse(source: &str, bytes: &[u8], fetcher: &dyn AssetFetcher) -> Result<Self, LoadError> {
        let (json, blob) = read_document(source, bytes)?;
        let json = resolve_compression(source, json)?;
        let root: gltf::json::Root =
            serde_json::from_value(json).map_err(|err| LoadError::decode(source, err))?;
        let document = gltf::Document::from_json(root).map_err(|err| LoadError::decode(source, err))?;

        let buffers = load_buffers(source, &document, blob, fetcher)?;
        log::debug!(
            "Model {}: {} nodes, {} meshes, {} buffers",
            source,
            document.nodes().len(),
            document.meshes().len(),
            buffers.len()
        );

        let materials = document
            .materials()
            .map(|material| load_material(source, &material, &buffers, fetcher))
            .collect::<Result<Vec<_>, _>>()?;

        let meshes = document
            .meshes()
            .map(|mesh| {
                mesh.primitives()
                    .filter_map(|primitive| load_primitive(source, &primitive, &buffers))
                    .collect::<Vec<_>>()
            })
            .collect();

        let nodes = document
            .nodes()
            .map(|node| {
                let (t, r, s) = node.transform().decomposed();
                ModelNode {
                    name: node.name().unwrap_or_default().to_string(),
                    transform: Transform::from_trs(Vec3::from(t), Quat::from_array(r), Vec3::from(s)),
                    mesh: node.mesh().map(|mesh| mesh.index()),
                    children: node.children().map(|child| child.index()).collect(),
                }
            })
            .collect::<Vec<_>>();

        let roots = match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => scene.nodes().map(|node| node.index()).collect(),
            None => {
                let mut is_child = vec![false; nodes.len()];
                for node in &nodes {
                    for &child in &node.children {
                        is_child[child] = true;
                    }
                }
                (0..nodes.len()).filter(|&i| !is_child[i]).collect()
            }
        };

        let animations = load_animations(source, &document, &buffers);

        Ok(Self {
            label: source.to_string(),
            nodes,
            roots,
            meshes,
            materials,
            animations,
        })
    }

    pub fn primitive_count(&self) -> usize {
        self.meshes.iter().map(Vec::len).sum()
    }
}

/// Splits a `.gltf` or `.glb` into its JSON and the GLB binary chunk.
fn read_document(source: &str, bytes: &[u8]) -> Result<(Value, Option<Vec<u8>>), LoadError> {
    if bytes.starts_with(b"glTF") {
        let glb = gltf::Glb::from_slice(bytes).map_err(|err| LoadError::decode(source, err))?;
        let json = serde_json::from_slice(&glb.json).map_err(|err| LoadError::decode(source, err))?;
        Ok((json, glb.bin.map(|bin| bin.into_owned())))
    } else {
        let json = serde_json::from_slice(bytes).map_err(|err| LoadError::decode(source, err))?;
        Ok((json, None))
    }
}

fn primitives(json: &Value) -> impl Iterator<Item = &Value> {
    json.get("meshes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|mesh| mesh.get("primitives").and_then(Value::as_array))
        .flatten()
}

/// True if the accessor at `index` has data outside any compressed stream.
fn has_plain_data(json: &Value, index: &Value) -> bool {
    index
        .as_u64()
        .and_then(|index| json.get("accessors")?.get(index as usize))
        .is_some_and(|accessor| accessor.get("bufferView").is_some() || accessor.get("sparse").is_some())
}

/// Rejects geometry that only exists in compressed form. A Draco primitive
/// that keeps plain accessors next to its compressed stream loads from those
/// accessors, and the Draco declarations are dropped so the import sees an
/// ordinary document.
fn resolve_compression(source: &str, mut json: Value) -> Result<Value, LoadError> {
    let unsupported = |extension: &str| LoadError::UnsupportedExtension {
        source_id: source.to_string(),
        extension: extension.to_string(),
    };

    let required = json
        .get("extensionsRequired")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    for extension in required {
        if UNSUPPORTED_EXTENSIONS.contains(&extension) {
            return Err(unsupported(extension));
        }
    }

    let mut fallbacks = 0;
    for primitive in primitives(&json) {
        let compressed = primitive
            .get("extensions")
            .and_then(|extensions| extensions.get(DRACO))
            .is_some();
        if !compressed {
            continue;
        }
        let attributes = primitive
            .get("attributes")
            .and_then(Value::as_object)
            .is_some_and(|attributes| attributes.values().all(|index| has_plain_data(&json, index)));
        let indices = primitive
            .get("indices")
            .map_or(true, |index| has_plain_data(&json, index));
        if !(attributes && indices) {
            return Err(unsupported(DRACO));
        }
        fallbacks += 1;
    }
    if fallbacks == 0 {
        return Ok(json);
    }

    log::info!(
        "{}: {} Draco primitive(s) load from their uncompressed accessors",
        source,
        fallbacks
    );
    if let Some(used) = json.get_mut("extensionsUsed").and_then(Value::as_array_mut) {
        used.retain(|extension| extension.as_str() != Some(DRACO));
    }
    if let Some(meshes) = json.get_mut("meshes").and_then(Value::as_array_mut) {
        for mesh in meshes {
            let Some(primitives) = mesh.get_mut("primitives").and_then(Value::as_array_mut) else {
                continue;
            };
            for primitive in primitives {
                if let Some(extensions) = primitive.get_mut("extensions").and_then(Value::as_object_mut) {
                    extensions.remove(DRACO);
                }
            }
        }
    }
    Ok(json)
}

fn load_external(source: &str, uri: &str, fetcher: &dyn AssetFetcher) -> Result<Vec<u8>, LoadError> {
    if let Some(rest) = uri.strip_prefix("data:") {
        let (_, encoded) = rest
            .split_once(',')
            .ok_or_else(|| LoadError::decode(source, "malformed data URI"))?;
        return base64::decode(encoded).map_err(|err| LoadError::decode(source, err));
    }

    let resolved = sibling_source(source, uri);
    fetcher
        .fetch(&resolved)
        .map_err(|reason| LoadError::fetch(resolved, reason))
}

fn load_buffers(
    source: &str,
    document: &gltf::Document,
    mut blob: Option<Vec<u8>>,
    fetcher: &dyn AssetFetcher,
) -> Result<Vec<Vec<u8>>, LoadError> {
    let mut buffers = Vec::with_capacity(document.buffers().len());
    for buffer in document.buffers() {
        let mut data = match buffer.source() {
            gltf::buffer::Source::Bin => blob
                .take()
                .ok_or_else(|| LoadError::decode(source, "GLB binary chunk missing"))?,
            gltf::buffer::Source::Uri(uri) => load_external(source, uri, fetcher)?,
        };
        if data.len() < buffer.length() {
            return Err(LoadError::decode(
                source,
                format!(
                    "buffer {} holds {} bytes, expected {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                ),
            ));
        }
        while data.len() % 4 != 0 {
            data.push(0);
        }
        buffers.push(data);
    }
    Ok(buffers)
}

fn load_material(
    source: &str,
    material: &gltf::Material,
    buffers: &[Vec<u8>],
    fetcher: &dyn AssetFetcher,
) -> Result<MaterialDesc, LoadError> {
    let pbr = material.pbr_metallic_roughness();
    let base_color_texture = match pbr.base_color_texture() {
        Some(info) => Some(load_image(source, info.texture(), buffers, fetcher)?),
        None => None,
    };
    // Normal maps hold vectors, not colours.
    let normal_texture = match material.normal_texture() {
        Some(normal) => Some(load_image(source, normal.texture(), buffers, fetcher)?.linear()),
        None => None,
    };

    Ok(MaterialDesc {
        name: material.name().unwrap_or_default().to_string(),
        base_color: Vec4::from_array(pbr.base_color_factor()),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        base_color_texture,
        normal_texture,
    })
}

fn load_image(
    source: &str,
    texture: gltf::Texture,
    buffers: &[Vec<u8>],
    fetcher: &dyn AssetFetcher,
) -> Result<TextureData, LoadError> {
    let image = texture.source();
    let label = format!("{}#image{}", source, image.index());
    let bytes = match image.source() {
        gltf::image::Source::View { view, .. } => {
            let buffer = &buffers[view.buffer().index()];
            let start = view.offset();
            let end = start + view.length();
            buffer
                .get(start..end)
                .ok_or_else(|| LoadError::decode(&label, "image view out of range"))?
                .to_vec()
        }
        gltf::image::Source::Uri { uri, .. } => load_external(source, uri, fetcher)?,
    };
    TextureData::decode(&label, &bytes)
}

fn load_primitive(
    source: &str,
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
) -> Option<ModelPrimitive> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        log::warn!(
            "{}: skipping primitive with mode {:?}",
            source,
            primitive.mode()
        );
        return None;
    }

    let reader = primitive.reader(|buffer| Some(buffers[buffer.index()].as_slice()));

    let Some(positions) = reader.read_positions() else {
        log::warn!("{}: skipping primitive without positions", source);
        return None;
    };
    let positions: Vec<[f32; 3]> = positions.collect();

    let uvs = reader
        .read_tex_coords(0)
        .map(|uv| uv.into_f32().collect::<Vec<_>>())
        .unwrap_or_else(|| vec![[0.0, 0.0]; positions.len()]);

    let indices = reader
        .read_indices()
        .map(|indices| indices.into_u32().collect::<Vec<_>>())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());

    let mut mesh = MeshData {
        normals: Vec::new(),
        positions,
        uvs,
        indices,
    };
    match reader.read_normals() {
        Some(normals) => mesh.normals = normals.collect(),
        None => {
            log::debug!("{}: generating normals", source);
            mesh.compute_normals();
        }
    }

    log::trace!(
        "    Primitive: {} vertices, {} indices",
        mesh.vertex_count(),
        mesh.indices.len()
    );

    Some(ModelPrimitive {
        mesh,
        material: primitive.material().index(),
    })
}

fn load_animations(source: &str, document: &gltf::Document, buffers: &[Vec<u8>]) -> Vec<ClipDesc> {
    let mut clips = Vec::with_capacity(document.animations().len());

    for (animation_index, animation) in document.animations().enumerate() {
        let name = animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Animation_{}", animation_index));
        let mut channels = Vec::new();

        for (channel_index, channel) in animation.channels().enumerate() {
            let reader = channel.reader(|buffer| Some(buffers[buffer.index()].as_slice()));
            let Some(inputs) = reader.read_inputs() else {
                log::warn!(
                    "{}: animation '{}' channel {} has no keyframes",
                    source,
                    name,
                    channel_index
                );
                continue;
            };
            let times: Vec<f32> = inputs.collect();
            if times.is_empty() {
                continue;
            }

            let (interpolation, cubic) = match channel.sampler().interpolation() {
                gltf::animation::Interpolation::Step => (AnimationInterpolation::Step, false),
                gltf::animation::Interpolation::Linear => (AnimationInterpolation::Linear, false),
                // Keep the spline values and drop the tangents.
                gltf::animation::Interpolation::CubicSpline => (AnimationInterpolation::Linear, true),
            };

            let (property, output) = match reader.read_outputs() {
                Some(gltf::animation::util::ReadOutputs::Translations(iter)) => (
                    TransformProperty::Translation,
                    AnimationOutput::Vec3(spline_values(iter.map(Vec3::from).collect(), cubic)),
                ),
                Some(gltf::animation::util::ReadOutputs::Scales(iter)) => (
                    TransformProperty::Scale,
                    AnimationOutput::Vec3(spline_values(iter.map(Vec3::from).collect(), cubic)),
                ),
                Some(gltf::animation::util::ReadOutputs::Rotations(rotations)) => (
                    TransformProperty::Rotation,
                    AnimationOutput::Quat(spline_values(
                        rotations.into_f32().map(Quat::from_array).collect(),
                        cubic,
                    )),
                ),
                _ => {
                    log::debug!(
                        "{}: animation '{}' channel {} targets an unsupported property",
                        source,
                        name,
                        channel_index
                    );
                    continue;
                }
            };

            let value_count = match &output {
                AnimationOutput::Vec3(values) => values.len(),
                AnimationOutput::Quat(values) => values.len(),
            };
            if value_count != times.len() {
                log::warn!(
                    "{}: animation '{}' channel {} has {} keys but {} values",
                    source,
                    name,
                    channel_index,
                    times.len(),
                    value_count
                );
                continue;
            }

            channels.push(ChannelDesc {
                node: channel.target().node().index(),
                property,
                sampler: AnimationSampler {
                    times,
                    output,
                    interpolation,
                },
            });
        }

        clips.push(ClipDesc { name, channels });
    }

    clips
}

/// Cubic-spline outputs store `[in_tangent, value, out_tangent]` per key.
fn spline_values<T: Copy>(values: Vec<T>, cubic: bool) -> Vec<T> {
    if !cubic {
        return values;
    }
    values.chunks_exact(3).map(|triple| triple[1]).collect()
}

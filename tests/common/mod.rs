#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use orbit_showcase::asset::{LoadCompletion, LoadTicket, LoadedAsset, ModelData};
use orbit_showcase::error::{LoadError, RenderError};
use orbit_showcase::io::AssetFetcher;
use orbit_showcase::render_loop::SceneRenderer;
use orbit_showcase::scene::{Camera, SceneGraph};
use orbit_showcase::time::TimeSource;
use std::cell::Cell;
use std::collections::VecDeque;

/// In-memory fetcher keyed by source id.
#[derive(Default, Clone)]
pub struct MapFetcher(pub HashMap<String, Vec<u8>>);

impl MapFetcher {
    pub fn with(mut self, source: &str, bytes: Vec<u8>) -> Self {
        self.0.insert(source.to_string(), bytes);
        self
    }

    pub fn shared(self) -> Arc<dyn AssetFetcher> {
        Arc::new(self)
    }
}

impl AssetFetcher for MapFetcher {
    fn fetch(&self, source: &str) -> Result<Vec<u8>, String> {
        self.0
            .get(source)
            .cloned()
            .ok_or_else(|| format!("{} not found", source))
    }
}

pub fn png(size: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(size, size, image::Rgba(rgba));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

/// Typeface JSON with a hollow square for every letter the showcase uses.
pub fn typeface() -> Vec<u8> {
    let outline = "m 0 0 l 0 100 l 100 100 l 100 0 l 0 0 m 25 25 l 75 25 l 75 75 l 25 75 l 25 25";
    let mut glyphs = serde_json::Map::new();
    for ch in "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz:!".chars() {
        glyphs.insert(ch.to_string(), serde_json::json!({ "ha": 120, "o": outline }));
    }
    glyphs.insert(" ".to_string(), serde_json::json!({ "ha": 60 }));
    serde_json::to_vec(&serde_json::json!({
        "familyName": "Fixture",
        "resolution": 100,
        "boundingBox": { "xMin": 0, "xMax": 100, "yMin": -20, "yMax": 100 },
        "underlineThickness": 10,
        "glyphs": glyphs
    }))
    .expect("encode typeface")
}

fn push_f32s(bytes: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
}

fn triangle_buffer() -> Vec<u8> {
    let mut bin = Vec::new();
    push_f32s(&mut bin, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    bin.extend_from_slice(&[0, 0]);
    push_f32s(&mut bin, &[0.0, 2.0]);
    push_f32s(&mut bin, &[0.0, 0.0, 0.0, 4.0, 0.0, 0.0]);
    bin
}

/// A one-triangle model with two 2-second translation clips. `uri` of None
/// leaves the buffer to a GLB binary chunk.
fn triangle_json(uri: Option<&str>) -> String {
    let buffer = match uri {
        Some(uri) => format!(r#"{{ "uri": "{}", "byteLength": 76 }}"#, uri),
        None => r#"{ "byteLength": 76 }"#.to_string(),
    };
    format!(
        r#"{{
        "asset": {{ "version": "2.0" }},
        "scene": 0,
        "scenes": [ {{ "nodes": [0] }} ],
        "nodes": [
            {{ "name": "root", "children": [1] }},
            {{ "name": "body", "mesh": 0 }}
        ],
        "meshes": [ {{ "primitives": [ {{ "attributes": {{ "POSITION": 0 }}, "indices": 1, "material": 0 }} ] }} ],
        "materials": [ {{ "name": "skin", "pbrMetallicRoughness": {{ "metallicFactor": 0.2, "roughnessFactor": 0.7 }} }} ],
        "buffers": [ {buffer} ],
        "bufferViews": [
            {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
            {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }},
            {{ "buffer": 0, "byteOffset": 44, "byteLength": 8 }},
            {{ "buffer": 0, "byteOffset": 52, "byteLength": 24 }}
        ],
        "accessors": [
            {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0] }},
            {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }},
            {{ "bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR", "min": [0], "max": [2] }},
            {{ "bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3" }}
        ],
        "animations": [
            {{ "name": "Swim", "samplers": [ {{ "input": 2, "output": 3 }} ], "channels": [ {{ "sampler": 0, "target": {{ "node": 1, "path": "translation" }} }} ] }},
            {{ "name": "Idle", "samplers": [ {{ "input": 2, "output": 3, "interpolation": "STEP" }} ], "channels": [ {{ "sampler": 0, "target": {{ "node": 0, "path": "translation" }} }} ] }}
        ]
    }}"#
    )
}

pub fn animated_gltf() -> Vec<u8> {
    let uri = format!(
        "data:application/octet-stream;base64,{}",
        base64::encode(triangle_buffer())
    );
    triangle_json(Some(&uri)).into_bytes()
}

pub fn animated_glb() -> Vec<u8> {
    let mut json = triangle_json(None).into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = triangle_buffer();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}

pub fn draco_gltf() -> Vec<u8> {
    br#"{ "asset": { "version": "2.0" },
        "extensionsUsed": ["KHR_draco_mesh_compression"],
        "extensionsRequired": ["KHR_draco_mesh_compression"] }"#
        .to_vec()
}

/// The animated triangle with its primitive also carrying a Draco stream,
/// keeping the plain accessors as the uncompressed fallback.
pub fn draco_fallback_gltf() -> Vec<u8> {
    let mut json: serde_json::Value = serde_json::from_slice(&animated_gltf()).expect("fixture json");
    json["extensionsUsed"] = serde_json::json!(["KHR_draco_mesh_compression"]);
    json["meshes"][0]["primitives"][0]["extensions"] = serde_json::json!({
        "KHR_draco_mesh_compression": { "bufferView": 0, "attributes": { "POSITION": 0 } }
    });
    serde_json::to_vec(&json).expect("fixture json")
}

pub fn model(source: &str) -> ModelData {
    ModelData::parse(source, &animated_gltf(), &MapFetcher::default()).expect("parse fixture model")
}

pub fn success<T>(ticket: &LoadTicket<T>, asset: LoadedAsset) -> LoadCompletion {
    LoadCompletion {
        id: ticket.id(),
        source: ticket.source().to_string(),
        result: Ok(asset),
    }
}

pub fn failure<T>(ticket: &LoadTicket<T>) -> LoadCompletion {
    LoadCompletion {
        id: ticket.id(),
        source: ticket.source().to_string(),
        result: Err(LoadError::fetch(ticket.source(), "connection reset")),
    }
}

/// Advances by a fixed step every reading, or replays a script.
pub struct ScriptedTime {
    readings: std::cell::RefCell<VecDeque<f64>>,
    last: Cell<f64>,
    step: f64,
}

impl ScriptedTime {
    pub fn steps(step: f64) -> Self {
        Self {
            readings: Default::default(),
            last: Cell::new(0.0),
            step,
        }
    }

    pub fn readings(values: &[f64]) -> Self {
        Self {
            readings: std::cell::RefCell::new(values.iter().copied().collect()),
            last: Cell::new(0.0),
            step: 0.0,
        }
    }
}

impl TimeSource for ScriptedTime {
    fn elapsed_seconds(&self) -> f64 {
        let next = self
            .readings
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.last.get() + self.step);
        self.last.set(next);
        next
    }
}

/// What the render loop asked the renderer to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Render { eye: glam::Vec3, nodes: usize },
    Viewport(u32, u32),
    PixelDensity(f64),
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
    pub results: VecDeque<Result<(), RenderError>>,
}

impl RecordingRenderer {
    pub fn failing(results: Vec<Result<(), RenderError>>) -> Self {
        Self {
            calls: Vec::new(),
            results: results.into(),
        }
    }

    pub fn rendered_eyes(&self) -> Vec<glam::Vec3> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::Render { eye, .. } => Some(*eye),
                _ => None,
            })
            .collect()
    }
}

impl SceneRenderer for RecordingRenderer {
    fn render(&mut self, graph: &SceneGraph, camera: &Camera) -> Result<(), RenderError> {
        self.calls.push(RenderCall::Render {
            eye: camera.eye,
            nodes: graph.node_count(),
        });
        self.results.pop_front().unwrap_or(Ok(()))
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.calls.push(RenderCall::Viewport(width, height));
    }

    fn set_pixel_density(&mut self, ratio: f64) {
        self.calls.push(RenderCall::PixelDensity(ratio));
    }
}

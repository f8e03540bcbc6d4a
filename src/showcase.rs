// showcase.rs
// The portfolio scene: static nodes, the asset requests and the insertions
// they feed, the live parameter panel, and the per-frame driver that ties the
// loader pool to the render loop.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use hecs::Entity;

use crate::asset::{
    AssetLoaderPool, Bevel, CubemapData, Font, Handle, MeshData, ModelData, TextGeometry, TextOptions,
    TextureData, CUBE_FACE_NAMES,
};
use crate::error::{BindingError, StartupError};
use crate::io::AssetFetcher;
use crate::params::{ParamValue, ParameterRegistry};
use crate::render_loop::{RenderLoop, SceneRenderer, TickOutcome};
use crate::scene::{
    AssemblyStats, DirectionalLight, GlobalParams, Material, SceneAssembler, SceneNode,
    ShadowConfig, Transform,
};
use crate::settings::ShowcaseSettings;
use crate::stage::Stage;
use crate::time::FrameClock;

pub const ENVIRONMENT_DIR: &str = "textures/environmentMap";
pub const FLOOR_TEXTURE: &str = "textures/Wood/Wood_Floor_009_basecolor.jpg";
pub const FLOOR_NORMAL_TEXTURE: &str = "textures/Wood/Wood_Floor_009_normal.jpg";
pub const MATCAP_TEXTURE: &str = "textures/matcaps/3.png";
pub const FONT: &str = "fonts/helvetiker_regular.typeface.json";
pub const SLIPKNOT_MODEL: &str = "models/animationfirst/glTF/slipknotDraco.gltf";
pub const PROTEIN_MODEL: &str = "models/animationfirst/glTF/proteinDraco.gltf";
pub const STAND_MODEL: &str = "models/podklad/glTF/podkladka.glb";

pub const CREDIT_TEXT: &str = "Creator: Bartosz Jarzylo";
pub const HINT_TEXT: &str = "Use the control panel \n to play with lights!";

const FLOOR_SIZE: f32 = 15.0;
const FLOOR_REPEAT: f32 = 1.5;
const LIGHT_POSITION: Vec3 = Vec3::new(3.7, 2.0, -1.25);

/// `textures/environmentMap/px.jpg` and friends, in cube face order.
pub fn environment_faces() -> [String; 6] {
    CUBE_FACE_NAMES.map(|face| format!("{}/{}.jpg", ENVIRONMENT_DIR, face))
}

/// Nodes and materials that exist before any load finishes.
#[derive(Debug, Clone, Copy)]
pub struct StaticNodes {
    pub light: Entity,
    pub floor: Entity,
    pub floor_material: Handle<Material>,
    pub text_material: Handle<Material>,
}

pub fn build_static(stage: &mut Stage) -> StaticNodes {
    let light = stage.set_light(
        DirectionalLight {
            color: Vec3::ONE,
            intensity: 4.0,
            cast_shadow: true,
            shadow: ShadowConfig {
                far: 15.0,
                map_size: 1024,
                normal_bias: 0.05,
            },
        },
        LIGHT_POSITION,
    );

    let assets = &mut stage.graph.assets;
    let floor_mesh = assets.meshes.insert(MeshData::plane(FLOOR_SIZE, FLOOR_SIZE));
    let floor_material = assets
        .materials
        .insert(Material::standard("floor").with_uv_repeat(FLOOR_REPEAT));
    let text_material = assets.materials.insert(Material::matcap("text"));

    let floor = stage.graph.insert(
        SceneNode::mesh("floor", floor_mesh, floor_material)
            .with_transform(Transform::IDENTITY.with_euler(-FRAC_PI_2, 0.0, 0.0)),
    );

    // The floor is reactive too and must match before the first frame, even
    // if no model ever loads.
    stage.normalize();

    StaticNodes {
        light,
        floor,
        floor_material,
        text_material,
    }
}

/// Registers the panel's bindings over the stage.
pub fn bind_parameters(registry: &mut ParameterRegistry<Stage>) -> Result<(), BindingError> {
    registry
        .bind_scalar(
            "envMapIntensity",
            "params.env_map_intensity",
            0.0..=4.0,
            0.001,
            |stage: &Stage| stage.params.env_map_intensity,
            |stage: &mut Stage, value| stage.set_env_map_intensity(value),
        )?
        .on_change(|stage: &mut Stage| {
            stage.normalize();
        });

    registry.bind_scalar(
        "lightIntensity",
        "directionalLight.intensity",
        0.0..=10.0,
        0.001,
        |stage: &Stage| stage.light_intensity(),
        |stage: &mut Stage, value| stage.set_light_intensity(value),
    )?;

    let axes: [(&str, &str, usize); 3] = [
        ("lightX", "directionalLight.position.x", 0),
        ("lightY", "directionalLight.position.y", 1),
        ("lightZ", "directionalLight.position.z", 2),
    ];
    for (name, target, axis) in axes {
        registry.bind_scalar(
            name,
            target,
            -5.0..=5.0,
            0.001,
            move |stage: &Stage| stage.light_position()[axis],
            move |stage: &mut Stage, value| {
                let mut position = stage.light_position();
                position[axis] = value;
                stage.set_light_position(position);
            },
        )?;
    }
    Ok(())
}

fn text_options() -> TextOptions {
    TextOptions {
        size: 0.3,
        depth: 0.6,
        curve_segments: 4,
        bevel: Some(Bevel {
            thickness: 0.03,
            size: 0.02,
            offset: 0.0,
            segments: 3,
        }),
    }
}

/// Issues every asset request and registers what each result becomes.
/// Returns the number of requests issued.
pub fn request_assets(
    pool: &mut AssetLoaderPool,
    assembler: &mut SceneAssembler<Stage>,
    nodes: &StaticNodes,
) -> usize {
    let floor_material = nodes.floor_material;
    let text_material = nodes.text_material;

    let environment = pool.load_cubemap(environment_faces());
    assembler.on_loaded("environment", &environment, |stage: &mut Stage, cubemap: CubemapData| {
        stage.graph.set_environment(cubemap);
    });

    let floor = pool.load_texture(FLOOR_TEXTURE);
    assembler.on_loaded("floor texture", &floor, move |stage: &mut Stage, texture: TextureData| {
        let assets = &mut stage.graph.assets;
        let handle = assets.textures.insert(texture.repeating());
        if let Some(material) = assets.materials.get_mut(floor_material) {
            material.set_texture(handle);
        }
    });

    let floor_normal = pool.load_texture(FLOOR_NORMAL_TEXTURE);
    assembler.on_loaded(
        "floor normal map",
        &floor_normal,
        move |stage: &mut Stage, texture: TextureData| {
            let assets = &mut stage.graph.assets;
            let handle = assets.textures.insert(texture.linear().repeating());
            if let Some(material) = assets.materials.get_mut(floor_material) {
                material.set_normal_texture(handle);
            }
        },
    );

    let matcap = pool.load_texture(MATCAP_TEXTURE);
    assembler.on_loaded("matcap", &matcap, move |stage: &mut Stage, texture: TextureData| {
        let assets = &mut stage.graph.assets;
        let handle = assets.textures.insert(texture);
        if let Some(material) = assets.materials.get_mut(text_material) {
            material.set_texture(handle);
        }
    });

    // Both labels wait on their own font request; neither appears unless both
    // arrive.
    let credit_font = pool.load_font(FONT);
    let hint_font = pool.load_font(FONT);
    assembler.on_both(
        "text",
        &credit_font,
        &hint_font,
        move |stage: &mut Stage, credit: Font, hint: Font| {
            let labels = [
                (
                    "creditText",
                    TextGeometry::build(&credit, CREDIT_TEXT, text_options()),
                    Transform::from_translation(Vec3::new(4.0, 0.0, 4.5)).with_euler(-0.5, 4.9, 0.0),
                ),
                (
                    "hintText",
                    TextGeometry::build(&hint, HINT_TEXT, text_options()),
                    Transform::from_translation(Vec3::new(-10.0, 1.0, 0.0)).with_euler(-0.5, 0.0, 0.0),
                ),
            ];
            for (name, mesh, transform) in labels {
                let mesh = stage.graph.assets.meshes.insert(mesh);
                stage
                    .graph
                    .insert(SceneNode::mesh(name, mesh, text_material).with_transform(transform));
            }
        },
    );

    let slipknot = pool.load_model(SLIPKNOT_MODEL);
    assembler.on_loaded("slipknot", &slipknot, |stage: &mut Stage, model: ModelData| {
        stage.insert_model(
            &model,
            "slipknot",
            Transform::from_translation(Vec3::new(1.0, 2.0, -2.0))
                .with_euler(2.0, 0.0, -2.0)
                .with_scale(0.06),
        );
    });

    let protein = pool.load_model(PROTEIN_MODEL);
    assembler.on_loaded("protein", &protein, |stage: &mut Stage, model: ModelData| {
        let instance = stage.insert_model(
            &model,
            "protein",
            Transform::from_translation(Vec3::new(-2.5, 1.3, -1.0)).with_scale(0.08),
        );
        if stage.play(&instance, 0).is_none() {
            log::warn!("protein model has no animation to play");
        }
    });

    let stands = [("standLeft", Vec3::new(-2.5, 0.0, -1.0)), ("standRight", Vec3::new(4.0, 0.0, -1.0))];
    for (name, position) in stands {
        let stand = pool.load_model(STAND_MODEL);
        assembler.on_loaded(name, &stand, move |stage: &mut Stage, model: ModelData| {
            stage.insert_model(
                &model,
                name,
                Transform::from_translation(position)
                    .with_euler(0.0, 9.3, 0.0)
                    .with_scale(0.5),
            );
        });
    }

    // environment, floor colour and normal, matcap, two fonts, four models
    10
}

/// The whole interactive scene, minus the window and the GPU.
pub struct Showcase {
    pub stage: Stage,
    pub params: ParameterRegistry<Stage>,
    pub nodes: StaticNodes,
    assembler: SceneAssembler<Stage>,
    pool: AssetLoaderPool,
    render_loop: RenderLoop,
}

impl Showcase {
    /// Builds the static scene and the panel, then issues every asset load.
    pub fn new(
        settings: &ShowcaseSettings,
        fetcher: Arc<dyn AssetFetcher>,
        clock: FrameClock,
    ) -> Result<Self, StartupError> {
        let mut stage = Stage::new(
            &settings.camera,
            GlobalParams {
                env_map_intensity: settings.env_map_intensity,
            },
        );
        let nodes = build_static(&mut stage);

        let mut params = ParameterRegistry::new();
        bind_parameters(&mut params)?;

        let mut pool = AssetLoaderPool::new(fetcher, settings.assets.loader_threads)?;
        let mut assembler = SceneAssembler::new();
        let issued = request_assets(&mut pool, &mut assembler, &nodes);
        log::info!(
            "Showcase ready: {} bindings, {} asset requests in flight",
            params.len(),
            issued
        );

        Ok(Self {
            stage,
            params,
            nodes,
            assembler,
            pool,
            render_loop: RenderLoop::new(clock, settings.render_loop.max_consecutive_failures),
        })
    }

    pub fn start(&mut self) {
        self.render_loop.start();
    }

    pub fn render_loop(&self) -> &RenderLoop {
        &self.render_loop
    }

    /// Applies finished loads, then runs one tick of the render loop.
    pub fn frame(&mut self, renderer: &mut dyn SceneRenderer) -> TickOutcome {
        self.assembler.drain(&mut self.pool, &mut self.stage);
        self.render_loop.tick(&mut self.stage, renderer)
    }

    /// Blocks until every issued load has been applied or `timeout` passes.
    /// Returns the number of insertions that ran.
    pub fn wait_for_loads(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        while self.pool.in_flight() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                log::warn!("{} asset loads still pending after {:?}", self.pool.in_flight(), timeout);
                break;
            }
            match self.pool.next_timeout(remaining) {
                Some(completion) => ran += self.assembler.deliver(completion, &mut self.stage),
                None => break,
            }
        }
        ran
    }

    pub fn loads_in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    pub fn assembly(&self) -> AssemblyStats {
        self.assembler.stats()
    }

    pub fn load_failures(&self) -> &[crate::error::LoadError] {
        self.assembler.failures()
    }

    /// Window resize in logical pixels.
    pub fn resize(&mut self, width: u32, height: u32, renderer: &mut dyn SceneRenderer) {
        self.stage.resize(width, height);
        renderer.set_viewport(width, height);
    }

    pub fn set_parameter(&mut self, name: &str, value: f32) -> Result<ParamValue, BindingError> {
        self.params.set(name, ParamValue::Scalar(value), &mut self.stage)
    }

    pub fn nudge_parameter(&mut self, name: &str, steps: f32) -> Result<ParamValue, BindingError> {
        self.params.nudge(name, steps, &mut self.stage)
    }

    pub fn describe_parameters(&self) -> Vec<String> {
        self.params.describe(&self.stage)
    }
}

// scene/graph.rs
// The shared scene tree. Nodes are hecs entities linked through Parent and
// Children components under a single root entity; nodes are only ever attached
// to an existing parent at creation, so the tree stays acyclic.

use std::collections::HashSet;

use glam::{Mat4, Vec3};
use hecs::{Entity, World};

use super::animation::{AnimationChannel, AnimationClip};
use super::components::*;
use super::material::Material;
use super::transform::Transform;
use crate::asset::{Assets, CubemapData, Handle, MeshData, ModelData, WrapMode};

/// Description of a node to insert.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<Handle<MeshData>>,
    pub material: Option<Handle<Material>>,
    pub shadows: ShadowFlags,
    pub light: Option<DirectionalLight>,
}

impl SceneNode {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            mesh: None,
            material: None,
            shadows: ShadowFlags::empty(),
            light: None,
        }
    }

    pub fn mesh(name: impl Into<String>, mesh: Handle<MeshData>, material: Handle<Material>) -> Self {
        Self {
            mesh: Some(mesh),
            material: Some(material),
            ..Self::group(name)
        }
    }

    pub fn light(name: impl Into<String>, light: DirectionalLight) -> Self {
        Self {
            light: Some(light),
            ..Self::group(name)
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_shadows(mut self, shadows: ShadowFlags) -> Self {
        self.shadows = shadows;
        self
    }
}

/// One mesh ready to draw, flattened out of the hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct Drawable {
    pub entity: Entity,
    pub mesh: Handle<MeshData>,
    pub material: Handle<Material>,
    pub model: Mat4,
    pub shadows: ShadowFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct LightView {
    pub entity: Entity,
    pub light: DirectionalLight,
    pub position: Vec3,
}

/// Entities and clips created from a loaded model.
#[derive(Debug)]
pub struct ModelInstance {
    pub root: Entity,
    pub clips: Vec<AnimationClip>,
    pub node_count: usize,
}

pub struct SceneGraph {
    pub world: World,
    pub assets: Assets,
    root: Entity,
    environment: Option<Handle<CubemapData>>,
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut world = World::new();
        let root = world.spawn((
            Name::new("root"),
            TransformComponent(Transform::IDENTITY),
            WorldTransform(Transform::IDENTITY),
            Children::default(),
        ));
        Self {
            world,
            assets: Assets::new(),
            root,
            environment: None,
        }
    }

    pub fn root(&self) -> Entity {
        self.root
    }

    /// Inserts under the root.
    pub fn insert(&mut self, node: SceneNode) -> Entity {
        let root = self.root;
        self.spawn_under(node, root)
    }

    pub fn insert_under(&mut self, node: SceneNode, parent: Entity) -> Result<Entity, hecs::NoSuchEntity> {
        if !self.world.contains(parent) {
            return Err(hecs::NoSuchEntity);
        }
        Ok(self.spawn_under(node, parent))
    }

    fn spawn_under(&mut self, node: SceneNode, parent: Entity) -> Entity {
        let parent_world = self
            .world
            .get::<&WorldTransform>(parent)
            .map(|wt| wt.0)
            .unwrap_or(Transform::IDENTITY);

        let mut builder = hecs::EntityBuilder::new();
        builder
            .add(Name::new(node.name))
            .add(TransformComponent(node.transform))
            .add(WorldTransform(parent_world.mul_transform(&node.transform)))
            .add(Parent(parent))
            .add(Children::default())
            .add(node.shadows);
        if let Some(mesh) = node.mesh {
            builder.add(MeshComponent(mesh));
        }
        if let Some(material) = node.material {
            builder.add(MaterialComponent(material));
        }
        if let Some(light) = node.light {
            builder.add(light);
        }
        let entity = self.world.spawn(builder.build());

        let attached = self
            .world
            .get::<&mut Children>(parent)
            .map(|mut children| children.0.push(entity))
            .is_ok();
        if !attached {
            if let Err(e) = self.world.insert_one(parent, Children(vec![entity])) {
                log::error!("Failed to attach {:?} to {:?}: {:?}", entity, parent, e);
            }
        }
        entity
    }

    /// Depth-first walk from the root. Each live node is visited exactly once,
    /// parents before children, with its depth.
    pub fn traverse(&self, mut visit: impl FnMut(&World, Entity, usize)) {
        let mut stack = vec![(self.root, 0usize)];
        let mut seen = HashSet::new();
        while let Some((entity, depth)) = stack.pop() {
            if !seen.insert(entity) {
                log::error!("Scene graph cycle detected at {:?}", entity);
                continue;
            }
            visit(&self.world, entity, depth);
            if let Ok(children) = self.world.get::<&Children>(entity) {
                for &child in children.0.iter().rev() {
                    if self.world.contains(child) {
                        stack.push((child, depth + 1));
                    }
                }
            }
        }
    }

    pub fn find(&self, mut predicate: impl FnMut(&World, Entity) -> bool) -> Vec<Entity> {
        let mut found = Vec::new();
        self.traverse(|world, entity, _| {
            if predicate(world, entity) {
                found.push(entity);
            }
        });
        found
    }

    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.find(|world, entity| {
            world
                .get::<&Name>(entity)
                .map(|n| n.0 == name)
                .unwrap_or(false)
        })
        .into_iter()
        .next()
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.traverse(|_, _, _| count += 1);
        count
    }

    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.world
            .get::<&Children>(entity)
            .map(|children| children.0.clone())
            .unwrap_or_default()
    }

    /// Despawns `entity` and everything below it. The root cannot be removed.
    pub fn remove_subtree(&mut self, entity: Entity) -> usize {
        if entity == self.root || !self.world.contains(entity) {
            return 0;
        }

        if let Ok(parent) = self.world.get::<&Parent>(entity).map(|p| p.0) {
            if let Ok(mut siblings) = self.world.get::<&mut Children>(parent) {
                siblings.0.retain(|&child| child != entity);
            }
        }

        let mut stack = vec![entity];
        let mut removed = 0;
        while let Some(current) = stack.pop() {
            stack.extend(self.children(current));
            if self.world.despawn(current).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    pub fn local_transform(&self, entity: Entity) -> Option<Transform> {
        self.world.get::<&TransformComponent>(entity).ok().map(|t| t.0)
    }

    pub fn set_local_transform(&mut self, entity: Entity, transform: Transform) {
        if let Ok(mut local) = self.world.get::<&mut TransformComponent>(entity) {
            local.0 = transform;
        }
    }

    pub fn world_transform(&self, entity: Entity) -> Option<Transform> {
        self.world.get::<&WorldTransform>(entity).ok().map(|t| t.0)
    }

    pub fn shadow_flags(&self, entity: Entity) -> ShadowFlags {
        self.world
            .get::<&ShadowFlags>(entity)
            .map(|flags| *flags)
            .unwrap_or_default()
    }

    pub fn material_of(&self, entity: Entity) -> Option<Handle<Material>> {
        self.world.get::<&MaterialComponent>(entity).ok().map(|m| m.0)
    }

    pub fn environment(&self) -> Option<Handle<CubemapData>> {
        self.environment
    }

    pub fn set_environment(&mut self, cubemap: CubemapData) -> Handle<CubemapData> {
        let handle = self.assets.cubemaps.insert(cubemap);
        self.environment = Some(handle);
        handle
    }

    /// Recomputes world transforms for the whole tree.
    pub fn propagate_transforms(&mut self) {
        let mut stack: Vec<(Entity, Transform)> = vec![(self.root, Transform::IDENTITY)];

        while let Some((entity, parent_world)) = stack.pop() {
            let local = match self.world.get::<&TransformComponent>(entity) {
                Ok(t) => t.0,
                Err(_) => {
                    log::trace!("Entity {:?} has no TransformComponent, skipping", entity);
                    continue;
                }
            };

            let world_transform = parent_world.mul_transform(&local);

            let updated = self
                .world
                .get::<&mut WorldTransform>(entity)
                .map(|mut wt| wt.0 = world_transform)
                .is_ok();
            if !updated {
                if let Err(e) = self.world.insert_one(entity, WorldTransform(world_transform)) {
                    log::error!("Failed to insert WorldTransform for entity {:?}: {:?}", entity, e);
                    continue;
                }
            }

            if let Ok(children) = self.world.get::<&Children>(entity) {
                for &child in children.0.iter().rev() {
                    stack.push((child, world_transform));
                }
            }
        }
    }

    pub fn drawables(&self) -> Vec<Drawable> {
        let mut drawables = Vec::new();
        self.traverse(|world, entity, _| {
            let (Ok(mesh), Ok(material)) = (
                world.get::<&MeshComponent>(entity),
                world.get::<&MaterialComponent>(entity),
            ) else {
                return;
            };
            let model = world
                .get::<&WorldTransform>(entity)
                .map(|wt| wt.0.matrix())
                .unwrap_or(Mat4::IDENTITY);
            let shadows = world
                .get::<&ShadowFlags>(entity)
                .map(|flags| *flags)
                .unwrap_or_default();
            drawables.push(Drawable {
                entity,
                mesh: mesh.0,
                material: material.0,
                model,
                shadows,
            });
        });
        drawables
    }

    pub fn lights(&self) -> Vec<LightView> {
        let mut lights = Vec::new();
        self.traverse(|world, entity, _| {
            if let Ok(light) = world.get::<&DirectionalLight>(entity) {
                let position = world
                    .get::<&WorldTransform>(entity)
                    .map(|wt| wt.0.translation)
                    .unwrap_or(Vec3::ZERO);
                lights.push(LightView {
                    entity,
                    light: *light,
                    position,
                });
            }
        });
        lights
    }

    pub fn light_mut(&mut self, entity: Entity) -> Option<hecs::RefMut<'_, DirectionalLight>> {
        self.world.get::<&mut DirectionalLight>(entity).ok()
    }

    /// Creates entities for `model` under a new group node placed by
    /// `transform`, registering its meshes, materials and textures.
    pub fn instantiate_model(
        &mut self,
        model: &ModelData,
        name: &str,
        transform: Transform,
    ) -> ModelInstance {
        let materials: Vec<Handle<Material>> = model
            .materials
            .iter()
            .enumerate()
            .map(|(index, desc)| {
                let label = if desc.name.is_empty() {
                    format!("{}#material{}", name, index)
                } else {
                    desc.name.clone()
                };
                let mut material = Material::standard(label)
                    .with_base_color(desc.base_color)
                    .with_metallic_roughness(desc.metallic, desc.roughness);
                if let Some(texture) = &desc.base_color_texture {
                    let mut texture = texture.clone();
                    texture.wrap = WrapMode::Repeat;
                    let handle = self.assets.textures.insert(texture);
                    material = material.with_texture(handle, 1.0);
                }
                if let Some(texture) = &desc.normal_texture {
                    let handle = self.assets.textures.insert(texture.clone().repeating());
                    material.set_normal_texture(handle);
                }
                self.assets.materials.insert(material)
            })
            .collect();

        let fallback_material = if model.meshes.iter().flatten().any(|p| p.material.is_none()) {
            Some(
                self.assets
                    .materials
                    .insert(Material::standard(format!("{}#default", name))),
            )
        } else {
            None
        };

        let meshes: Vec<Vec<(Handle<MeshData>, Option<Handle<Material>>)>> = model
            .meshes
            .iter()
            .map(|primitives| {
                primitives
                    .iter()
                    .map(|primitive| {
                        let handle = self.assets.meshes.insert(primitive.mesh.clone());
                        let material = primitive
                            .material
                            .and_then(|index| materials.get(index).copied())
                            .or(fallback_material);
                        (handle, material)
                    })
                    .collect()
            })
            .collect();

        let root = self.insert(SceneNode::group(name).with_transform(transform));
        let mut node_entities: Vec<Option<Entity>> = vec![None; model.nodes.len()];
        let mut stack: Vec<(usize, Entity)> = model.roots.iter().rev().map(|&i| (i, root)).collect();
        let mut node_count = 1;

        while let Some((index, parent)) = stack.pop() {
            let Some(desc) = model.nodes.get(index) else {
                continue;
            };
            if node_entities[index].is_some() {
                log::warn!("{}: node {} is referenced twice, ignoring", model.label, index);
                continue;
            }

            let primitives = desc.mesh.and_then(|mesh| meshes.get(mesh));
            let mut node = SceneNode::group(desc.name.clone()).with_transform(desc.transform);
            if let Some([(mesh, Some(material))]) = primitives.map(Vec::as_slice) {
                node.mesh = Some(*mesh);
                node.material = Some(*material);
            }
            let entity = self.spawn_under(node, parent);
            node_entities[index] = Some(entity);
            node_count += 1;

            if let Some(primitives) = primitives.filter(|p| p.len() > 1) {
                for (i, (mesh, material)) in primitives.iter().enumerate() {
                    let Some(material) = material else { continue };
                    self.spawn_under(
                        SceneNode::mesh(format!("{}#{}", desc.name, i), *mesh, *material),
                        entity,
                    );
                    node_count += 1;
                }
            }

            for &child in desc.children.iter().rev() {
                stack.push((child, entity));
            }
        }

        let clips = model
            .animations
            .iter()
            .map(|desc| {
                let mut clip = AnimationClip::new(desc.name.clone());
                for channel in &desc.channels {
                    let Some(entity) = node_entities.get(channel.node).copied().flatten() else {
                        log::warn!(
                            "{}: clip '{}' targets node {} outside the scene",
                            model.label,
                            desc.name,
                            channel.node
                        );
                        continue;
                    };
                    clip.add_channel(AnimationChannel {
                        sampler: channel.sampler.clone(),
                        entity,
                        property: channel.property,
                    });
                }
                clip
            })
            .collect();

        self.propagate_transforms();
        log::info!(
            "Instantiated {} with {} nodes, {} materials",
            model.label,
            node_count,
            materials.len()
        );

        ModelInstance {
            root,
            clips,
            node_count,
        }
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn mesh_node(graph: &mut SceneGraph, name: &str) -> SceneNode {
        let mesh = graph.assets.meshes.insert(MeshData::plane(1.0, 1.0));
        let material = graph.assets.materials.insert(Material::standard(name));
        SceneNode::mesh(name, mesh, material)
    }

    #[test]
    fn traversal_visits_every_node_once_parents_first() {
        let mut graph = SceneGraph::new();
        let a = graph.insert(SceneNode::group("a"));
        let b = graph.insert_under(SceneNode::group("b"), a).unwrap();
        let c = graph.insert(SceneNode::group("c"));

        let mut order = Vec::new();
        graph.traverse(|_, entity, depth| order.push((entity, depth)));
        assert_eq!(order, vec![(graph.root(), 0), (a, 1), (b, 2), (c, 1)]);
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn insert_under_missing_parent_fails() {
        let mut graph = SceneGraph::new();
        let a = graph.insert(SceneNode::group("a"));
        graph.remove_subtree(a);
        assert!(graph.insert_under(SceneNode::group("b"), a).is_err());
    }

    #[test]
    fn remove_subtree_detaches_and_despawns() {
        let mut graph = SceneGraph::new();
        let a = graph.insert(SceneNode::group("a"));
        graph.insert_under(SceneNode::group("b"), a).unwrap();
        graph.insert(SceneNode::group("c"));

        assert_eq!(graph.remove_subtree(a), 2);
        assert_eq!(graph.remove_subtree(graph.root()), 0);
        assert_eq!(graph.node_count(), 2);
        assert!(graph.find_by_name("b").is_none());
        assert!(graph.find_by_name("c").is_some());
    }

    #[test]
    fn world_transforms_follow_parents() {
        let mut graph = SceneGraph::new();
        let parent = graph.insert(
            SceneNode::group("parent")
                .with_transform(Transform::from_translation(Vec3::new(5.0, 0.0, 0.0))),
        );
        let child = graph
            .insert_under(
                SceneNode::group("child")
                    .with_transform(Transform::from_translation(Vec3::new(2.0, 0.0, 0.0))),
                parent,
            )
            .unwrap();
        assert_eq!(graph.world_transform(child).unwrap().translation, Vec3::new(7.0, 0.0, 0.0));

        graph.set_local_transform(
            parent,
            Transform::from_trs(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2), Vec3::ONE),
        );
        graph.propagate_transforms();
        assert!(graph
            .world_transform(child)
            .unwrap()
            .translation
            .abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), 1e-5));
    }

    #[test]
    fn drawables_and_lights_are_collected() {
        let mut graph = SceneGraph::new();
        let node = mesh_node(&mut graph, "floor").with_shadows(ShadowFlags::RECEIVE);
        let floor = graph.insert(node);
        graph.insert(
            SceneNode::light("sun", DirectionalLight::default())
                .with_transform(Transform::from_translation(Vec3::new(3.7, 2.0, -1.25))),
        );

        let drawables = graph.drawables();
        assert_eq!(drawables.len(), 1);
        assert_eq!(drawables[0].entity, floor);
        assert_eq!(drawables[0].shadows, ShadowFlags::RECEIVE);

        let lights = graph.lights();
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].position, Vec3::new(3.7, 2.0, -1.25));
    }

    #[test]
    fn instantiated_model_keeps_hierarchy_and_targets() {
        use crate::asset::model::tests::{animated_triangle_gltf, MapFetcher};

        let (json, bin) = animated_triangle_gltf("t.bin");
        let mut fetcher = MapFetcher::default();
        fetcher.0.insert("t.bin".into(), bin);
        let model = ModelData::parse("t.gltf", json.as_bytes(), &fetcher).unwrap();

        let mut graph = SceneGraph::new();
        let instance = graph.instantiate_model(&model, "protein", Transform::from_translation(Vec3::X));
        assert_eq!(instance.node_count, 3);
        assert_eq!(instance.clips.len(), 2);
        assert!((instance.clips[0].duration - 2.0).abs() < 1e-6);

        let body = graph.find_by_name("body").unwrap();
        assert_eq!(instance.clips[0].channels[0].entity, body);
        assert_eq!(graph.drawables().len(), 1);
        // group at x=1, gltf root at y=1
        assert_eq!(graph.world_transform(body).unwrap().translation, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(graph.assets.materials.len(), 1);
    }
}

// scene/normalize.rs
// Re-applies the global rendering parameters to every shaded mesh in the
// tree. Runs after a model is inserted and when a bound parameter changes,
// never per frame.

use std::collections::HashSet;

use super::components::{MaterialComponent, MeshComponent, ShadowFlags};
use super::graph::SceneGraph;

/// Parameters every environment-reactive material must reflect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalParams {
    pub env_map_intensity: f32,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            env_map_intensity: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Nodes carrying an environment-reactive material.
    pub nodes: usize,
    /// Materials whose intensity actually changed and were marked dirty.
    pub updated_materials: usize,
}

/// Sets each reactive material's environment intensity and forces shadow
/// casting and receiving on its nodes. Idempotent: an unchanged material keeps
/// its revision.
pub fn normalize(graph: &mut SceneGraph, params: &GlobalParams) -> NormalizeReport {
    let mut targets = Vec::new();
    {
        let assets = &graph.assets;
        graph.traverse(|world, entity, _| {
            if world.get::<&MeshComponent>(entity).is_err() {
                return;
            }
            let Ok(material) = world.get::<&MaterialComponent>(entity) else {
                return;
            };
            let reactive = assets
                .materials
                .get(material.0)
                .is_some_and(|m| m.is_environment_reactive());
            if reactive {
                targets.push((entity, material.0));
            }
        });
    }

    let mut seen = HashSet::new();
    let mut report = NormalizeReport {
        nodes: targets.len(),
        updated_materials: 0,
    };

    for (entity, handle) in targets {
        if let Ok(mut flags) = graph.world.get::<&mut ShadowFlags>(entity) {
            *flags = ShadowFlags::CAST | ShadowFlags::RECEIVE;
        }

        if !seen.insert(handle) {
            continue;
        }
        if let Some(material) = graph.assets.materials.get_mut(handle) {
            if material.env_map_intensity != params.env_map_intensity {
                material.env_map_intensity = params.env_map_intensity;
                material.mark_dirty();
                report.updated_materials += 1;
            }
        }
    }

    log::debug!(
        "Normalized {} shaded nodes ({} materials updated, envMapIntensity {})",
        report.nodes,
        report.updated_materials,
        params.env_map_intensity
    );
    report
}

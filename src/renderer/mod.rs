mod context;
pub mod depth;
mod gpu_assets;
pub mod pipeline_builder;
#[allow(clippy::module_inception)]
mod renderer;
mod shadow;
pub mod uniforms;
pub mod vertex;

pub(crate) use context::RenderContext;
pub use depth::RenderTargets;
pub(crate) use gpu_assets::GpuMesh;
pub use pipeline_builder::PipelineBuilder;
pub use renderer::{physical_size, WgpuRenderer};
pub use vertex::Vertex;

pub mod cache;
pub mod font;
pub mod handle;
pub mod loader;
pub mod mesh;
pub mod model;
pub mod text;
pub mod texture;
pub mod triangulate;

pub use cache::AssetCache;
pub use font::Font;
pub use handle::Handle;
pub use loader::{AssetLoaderPool, AssetRequest, FromLoaded, LoadCompletion, LoadTicket, LoadedAsset};
pub use mesh::MeshData;
pub use model::ModelData;
pub use text::{Bevel, TextGeometry, TextOptions};
pub use texture::{CubemapData, TextureData, WrapMode, CUBE_FACE_NAMES};

use crate::scene::Material;

/// CPU-side resources referenced from scene nodes by handle.
pub struct Assets {
    pub meshes: AssetCache<MeshData>,
    pub materials: AssetCache<Material>,
    pub textures: AssetCache<TextureData>,
    pub cubemaps: AssetCache<CubemapData>,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            meshes: AssetCache::new(),
            materials: AssetCache::new(),
            textures: AssetCache::new(),
            cubemaps: AssetCache::new(),
        }
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}

use std::path::{Path, PathBuf};

/// Resolves opaque asset identifiers to bytes. Loader workers call this from
/// pool threads, so implementations must be shareable.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, source: &str) -> Result<Vec<u8>, String>;
}

/// Reads assets from a directory on disk. Leading slashes are treated as
/// relative to the root, matching how web builds address `/textures/...`.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, source: &str) -> PathBuf {
        let mut trimmed = source.replace('\\', "/");
        while let Some(stripped) = trimmed.strip_prefix("./") {
            trimmed = stripped.to_string();
        }
        self.root.join(trimmed.trim_start_matches('/'))
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, source: &str) -> Result<Vec<u8>, String> {
        load_binary(&self.resolve(source))
    }
}

pub(crate) fn load_binary(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|err| format!("Failed to read {:?}: {}", path, err))
}

/// Joins `uri` onto the directory of `base`, the way glTF resolves buffers.
pub(crate) fn sibling_source(base: &str, uri: &str) -> String {
    if uri.starts_with('/') {
        return uri.to_string();
    }
    match base.rfind('/') {
        Some(index) => format!("{}/{}", &base[..index], uri),
        None => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_strips_leading_slash_and_dot_segments() {
        let fetcher = FileFetcher::new("static");
        assert_eq!(
            fetcher.resolve("/textures/matcaps/3.png"),
            Path::new("static/textures/matcaps/3.png")
        );
        assert_eq!(
            fetcher.resolve("./fonts/a.json"),
            Path::new("static/fonts/a.json")
        );
    }

    #[test]
    fn sibling_source_resolves_relative_to_model() {
        assert_eq!(
            sibling_source("/models/protein/scene.gltf", "scene.bin"),
            "/models/protein/scene.bin"
        );
        assert_eq!(sibling_source("scene.gltf", "scene.bin"), "scene.bin");
        assert_eq!(sibling_source("/a/b.gltf", "/c.bin"), "/c.bin");
    }

    #[test]
    fn missing_file_is_an_error() {
        let fetcher = FileFetcher::new(std::env::temp_dir());
        assert!(fetcher.fetch("orbit-showcase-missing-asset.bin").is_err());
    }
}

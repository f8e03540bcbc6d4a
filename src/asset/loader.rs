// asset/loader.rs
// Background asset loading. Every request runs on a worker thread and posts
// exactly one completion to a channel; the main thread drains the channel
// between frames, so workers never touch the scene.

use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use super::font::Font;
use super::model::ModelData;
use super::texture::{CubemapData, TextureData};
use crate::error::LoadError;
use crate::io::AssetFetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRequest {
    Texture(String),
    Cubemap([String; 6]),
    Font(String),
    Model(String),
}

impl AssetRequest {
    /// Identifier used in logs and errors. Cubemaps report their first face.
    pub fn source(&self) -> &str {
        match self {
            AssetRequest::Texture(source)
            | AssetRequest::Font(source)
            | AssetRequest::Model(source) => source,
            AssetRequest::Cubemap(faces) => &faces[0],
        }
    }

    fn run(&self, fetcher: &dyn AssetFetcher) -> Result<LoadedAsset, LoadError> {
        let fetch = |source: &str| {
            fetcher
                .fetch(source)
                .map_err(|reason| LoadError::fetch(source, reason))
        };

        match self {
            AssetRequest::Texture(source) => {
                let bytes = fetch(source)?;
                TextureData::decode(source, &bytes).map(LoadedAsset::Texture)
            }
            AssetRequest::Cubemap(faces) => {
                let decoded = faces[..]
                    .par_iter()
                    .map(|face| TextureData::decode(face, &fetch(face)?))
                    .collect::<Result<Vec<_>, _>>()?;
                CubemapData::from_faces(&faces[0], decoded).map(LoadedAsset::Cubemap)
            }
            AssetRequest::Font(source) => {
                let bytes = fetch(source)?;
                Font::parse(source, &bytes).map(LoadedAsset::Font)
            }
            AssetRequest::Model(source) => {
                let bytes = fetch(source)?;
                ModelData::parse(source, &bytes, fetcher).map(LoadedAsset::Model)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum LoadedAsset {
    Texture(TextureData),
    Cubemap(CubemapData),
    Font(Font),
    Model(ModelData),
}

impl LoadedAsset {
    pub fn kind(&self) -> &'static str {
        match self {
            LoadedAsset::Texture(_) => TextureData::KIND,
            LoadedAsset::Cubemap(_) => CubemapData::KIND,
            LoadedAsset::Font(_) => Font::KIND,
            LoadedAsset::Model(_) => ModelData::KIND,
        }
    }
}

/// Typed extraction from a [`LoadedAsset`].
pub trait FromLoaded: Sized {
    const KIND: &'static str;
    fn from_loaded(asset: LoadedAsset) -> Option<Self>;
}

macro_rules! impl_from_loaded {
    ($ty:ty, $variant:ident, $kind:literal) => {
        impl FromLoaded for $ty {
            const KIND: &'static str = $kind;
            fn from_loaded(asset: LoadedAsset) -> Option<Self> {
                match asset {
                    LoadedAsset::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

impl_from_loaded!(TextureData, Texture, "texture");
impl_from_loaded!(CubemapData, Cubemap, "cubemap");
impl_from_loaded!(Font, Font, "font");
impl_from_loaded!(ModelData, Model, "model");

/// Identifies one issued request and the type its completion carries.
pub struct LoadTicket<T> {
    id: u64,
    source: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> LoadTicket<T> {
    /// Ticket for request `id`. The pool issues these; building one by hand
    /// is only useful when replaying completions.
    pub fn issued(id: u64, source: &str) -> Self {
        Self {
            id,
            source: source.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl<T> Clone for LoadTicket<T> {
    fn clone(&self) -> Self {
        Self::issued(self.id, &self.source)
    }
}

impl<T> std::fmt::Debug for LoadTicket<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadTicket")
            .field("id", &self.id)
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LoadCompletion {
    pub id: u64,
    pub source: String,
    pub result: Result<LoadedAsset, LoadError>,
}

pub struct AssetLoaderPool {
    pool: rayon::ThreadPool,
    fetcher: Arc<dyn AssetFetcher>,
    sender: Sender<LoadCompletion>,
    receiver: Receiver<LoadCompletion>,
    next_id: u64,
    in_flight: usize,
}

impl AssetLoaderPool {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, threads: usize) -> Result<Self, LoadError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|index| format!("asset-loader-{}", index))
            .build()
            .map_err(|err| LoadError::Worker {
                source_id: format!("thread pool: {}", err),
            })?;
        let (sender, receiver) = channel();
        log::info!("Asset loader pool started with {} threads", threads.max(1));
        Ok(Self {
            pool,
            fetcher,
            sender,
            receiver,
            next_id: 0,
            in_flight: 0,
        })
    }

    pub fn load_texture(&mut self, source: &str) -> LoadTicket<TextureData> {
        self.issue(AssetRequest::Texture(source.to_string()))
    }

    /// Faces in `px, nx, py, ny, pz, nz` order.
    pub fn load_cubemap(&mut self, faces: [String; 6]) -> LoadTicket<CubemapData> {
        self.issue(AssetRequest::Cubemap(faces))
    }

    pub fn load_font(&mut self, source: &str) -> LoadTicket<Font> {
        self.issue(AssetRequest::Font(source.to_string()))
    }

    pub fn load_model(&mut self, source: &str) -> LoadTicket<ModelData> {
        self.issue(AssetRequest::Model(source.to_string()))
    }

    fn issue<T>(&mut self, request: AssetRequest) -> LoadTicket<T> {
        let id = self.next_id;
        self.next_id += 1;
        self.in_flight += 1;

        let ticket = LoadTicket::issued(id, request.source());
        log::info!("Loading {} (request {})", request.source(), id);

        let fetcher = Arc::clone(&self.fetcher);
        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let source = request.source().to_string();
            let result = catch_unwind(AssertUnwindSafe(|| request.run(fetcher.as_ref())))
                .unwrap_or_else(|_| {
                    Err(LoadError::Worker {
                        source_id: source.clone(),
                    })
                });
            // The receiver only disappears when the pool is being torn down.
            let _ = sender.send(LoadCompletion { id, source, result });
        });

        ticket
    }

    /// Next finished load, if any, without blocking.
    pub fn try_next(&mut self) -> Option<LoadCompletion> {
        let completion = self.receiver.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(completion)
    }

    /// Blocks up to `timeout` for the next finished load.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<LoadCompletion> {
        match self.receiver.recv_timeout(timeout) {
            Ok(completion) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(completion)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::font::tests::SQUARE_FONT;
    use crate::asset::model::tests::MapFetcher;

    fn pool_with(files: &[(&str, &[u8])]) -> AssetLoaderPool {
        let mut fetcher = MapFetcher::default();
        for (name, bytes) in files {
            fetcher.0.insert(name.to_string(), bytes.to_vec());
        }
        AssetLoaderPool::new(Arc::new(fetcher), 2).unwrap()
    }

    fn collect(pool: &mut AssetLoaderPool) -> Vec<LoadCompletion> {
        let mut done = Vec::new();
        while pool.in_flight() > 0 {
            done.push(pool.next_timeout(Duration::from_secs(10)).unwrap());
        }
        done
    }

    #[test]
    fn every_request_completes_exactly_once() {
        let mut pool = pool_with(&[("fonts/a.json", SQUARE_FONT.as_bytes())]);
        let font = pool.load_font("fonts/a.json");
        let missing = pool.load_texture("textures/missing.png");
        assert_eq!(pool.in_flight(), 2);

        let mut done = collect(&mut pool);
        done.sort_by_key(|c| c.id);
        assert_eq!(done.len(), 2);
        assert!(pool.try_next().is_none());

        assert_eq!(done[0].id, font.id());
        let loaded = done.remove(0).result.unwrap();
        assert_eq!(loaded.kind(), "font");
        assert!(Font::from_loaded(loaded).is_some());

        assert_eq!(done[0].id, missing.id());
        assert!(matches!(done[0].result, Err(LoadError::Fetch { .. })));
    }

    #[test]
    fn cubemap_fails_when_any_face_is_missing() {
        let mut pool = pool_with(&[]);
        let faces = crate::asset::CUBE_FACE_NAMES.map(|face| format!("env/{}.jpg", face));
        pool.load_cubemap(faces);
        let done = collect(&mut pool);
        assert!(matches!(done[0].result, Err(LoadError::Fetch { .. })));
    }

    #[test]
    fn wrong_kind_extraction_is_rejected() {
        let asset = LoadedAsset::Texture(TextureData::solid("white", [255; 4]));
        assert!(Font::from_loaded(asset.clone()).is_none());
        assert!(TextureData::from_loaded(asset).is_some());
    }
}

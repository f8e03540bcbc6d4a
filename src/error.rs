// error.rs
use thiserror::Error;

/// Failure of a single asset request. Never fatal to the application: the
/// subtree that depended on the asset simply never appears.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error("failed to fetch {source_id}: {reason}")]
    Fetch { source_id: String, reason: String },

    #[error("failed to decode {source_id}: {reason}")]
    Decode { source_id: String, reason: String },

    #[error("{source_id} requires unsupported extension {extension}")]
    UnsupportedExtension {
        source_id: String,
        extension: String,
    },

    #[error("{source_id} resolved to a {actual} but a {expected} was requested")]
    WrongKind {
        source_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("'{label}' skipped because dependencies failed: {failed:?}")]
    DependencyFailed { label: String, failed: Vec<String> },

    #[error("loader worker for {source_id} terminated without a result")]
    Worker { source_id: String },
}

impl LoadError {
    pub fn fetch(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure to produce one frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("surface lost")]
    SurfaceLost,
    #[error("surface outdated")]
    SurfaceOutdated,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("renderer is out of memory")]
    OutOfMemory,
    #[error("render failed: {0}")]
    Other(String),
}

impl RenderError {
    /// Transient failures are logged and the loop keeps going.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RenderError::OutOfMemory)
    }
}

impl From<wgpu::SurfaceError> for RenderError {
    fn from(err: wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Lost => RenderError::SurfaceLost,
            wgpu::SurfaceError::Outdated => RenderError::SurfaceOutdated,
            wgpu::SurfaceError::Timeout => RenderError::Timeout,
            wgpu::SurfaceError::OutOfMemory => RenderError::OutOfMemory,
            other => RenderError::Other(other.to_string()),
        }
    }
}

/// Conditions that prevent the application from starting at all.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Window(String),
    #[error("failed to create surface: {0}")]
    Surface(String),
    #[error("no suitable graphics adapter: {0}")]
    Adapter(String),
    #[error("failed to create device: {0}")]
    Device(String),
    #[error("asset loader could not start: {0}")]
    Loader(#[from] LoadError),
    #[error("control panel setup failed: {0}")]
    Bindings(#[from] BindingError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("a binding named '{0}' already exists")]
    DuplicateName(String),
    #[error("'{target}' is already bound by '{existing}'")]
    DuplicateTarget { target: String, existing: String },
    #[error("no binding named '{0}'")]
    UnknownBinding(String),
    #[error("binding '{name}' holds a {expected} value")]
    KindMismatch { name: String, expected: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_memory_is_the_only_permanent_render_error() {
        assert!(RenderError::SurfaceLost.is_transient());
        assert!(RenderError::SurfaceOutdated.is_transient());
        assert!(RenderError::Timeout.is_transient());
        assert!(RenderError::Other("x".into()).is_transient());
        assert!(!RenderError::OutOfMemory.is_transient());
    }

    #[test]
    fn load_error_messages_name_the_source() {
        let err = LoadError::fetch("models/a.glb", "not found");
        assert_eq!(err.to_string(), "failed to fetch models/a.glb: not found");
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving or planning a version, or while setting up
/// a download session. Individual transfer failures are reported through
/// [`crate::download::FailedArtifact`] instead and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    #[error("Cyclic inheritance: {}", chain.join(" -> "))]
    CyclicInheritance { chain: Vec<String> },

    #[error("Version {id} inherits from {parent}, which could not be loaded")]
    MissingAncestor { id: String, parent: String },

    #[error("Version {id} is missing required field: {field}")]
    IncompleteManifest { id: String, field: &'static str },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid maven coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Refusing path that leaves the install root: {0}")]
    UnsafePath(String),

    #[error("Invalid asset hash {hash:?} for {name}")]
    InvalidAssetHash { name: String, hash: String },

    #[error("Hash mismatch for {what}: expected {expected}, got {actual}")]
    HashMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Download session worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

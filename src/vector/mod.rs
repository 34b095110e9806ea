//! Persistent vector storage with approximate nearest-neighbor search.
//!
//! [`VectorStore`] is the public entry point. It owns an [`AnnIndex`]
//! backend together with the fragment metadata for every vector and writes
//! them as two sibling artifacts, `vectors.idx` and `vectors.meta.json`.

mod ann;
mod blob;
mod ivf;
mod kmeans;
mod manifest;
mod store;
mod types;

pub use ann::{AnnIndex, FlatIndex};
pub use ivf::{DEFAULT_MIN_TRAIN_SIZE, DEFAULT_PROBES, IvfFlatIndex, IvfParams};
pub use manifest::{MANIFEST_VERSION, StoreManifest};
pub use store::{INDEX_FILE, IndexConfig, MANIFEST_FILE, SearchHit, StoreState, VectorStore};
pub use types::{ClusterId, IndexVariant, Score, VectorDimension, VectorId, dot, normalize};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the vector store.
///
/// Structural errors (length, dimension, integrity) halt the operation that
/// raised them; the store is left as it was before the call.
#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Got {vectors} vectors but {metadata} metadata records")]
    LengthMismatch { vectors: usize, metadata: usize },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Index at {} has dimension {actual}, expected {expected}. Rebuild the index",
        path.display()
    )]
    IndexDimensionMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid vector dimension: {dimension}")]
    InvalidDimension { dimension: usize },

    #[error("Unknown index variant '{0}' (expected 'flat' or 'ivf-flat')")]
    UnknownVariant(String),

    #[error("No index has been built yet")]
    NotBuilt,

    #[error("No index found: {} does not exist", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("Index at {} is corrupt or incompatible: {reason}. Rebuild the index", path.display())]
    Integrity { path: PathBuf, reason: String },

    #[error("Cannot {operation} a store in state '{state}'")]
    InvalidState {
        operation: &'static str,
        state: StoreState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VectorStoreError {
    pub(crate) fn integrity(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Nothing has been built yet; expected on a first run.
    pub fn is_first_run(&self) -> bool {
        matches!(self, Self::NotBuilt | Self::MissingArtifact { .. })
    }

    /// An existing index cannot be used as is and must be rebuilt.
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, Self::Integrity { .. } | Self::IndexDimensionMismatch { .. })
    }
}

pub type VectorStoreResult<T> = Result<T, VectorStoreError>;

//! Text embedding: the pluggable model capability and its persistent cache.
//!
//! The model is injected as an [`EmbeddingGenerator`]; nothing here loads a
//! model lazily or keeps global state. [`EmbeddingCache`] wraps any generator
//! and memoizes vectors on disk keyed by `(model identity, text)`.

mod cache;
mod generator;

pub use cache::{CacheStats, EmbeddingCache, cache_key};
pub use generator::{
    DEFAULT_MODEL, EmbeddingGenerator, FastEmbedGenerator, model_from_name, model_to_string,
};

use thiserror::Error;

/// Errors from the embedding capability.
///
/// `Configuration` means retrying cannot help until settings change. The
/// other variants are failures while running an otherwise valid model.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding model misconfigured: {0}")]
    Configuration(String),

    #[error("Failed to generate embeddings: {0}")]
    Inference(String),

    #[error("Embedding dimension mismatch for model {model}: expected {expected}, got {actual}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("Model {model} returned {actual} embeddings for {expected} inputs")]
    CountMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },
}

impl EmbeddingError {
    /// Whether fixing settings (model name, model files) is required.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

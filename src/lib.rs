pub mod chunking;
pub mod config;
pub mod indexing;
pub mod logging;
pub mod retrieve;
pub mod semantic;
pub mod types;
pub mod utils;
pub mod vector;

pub use chunking::{Chunker, ChunkerRegistry};
pub use config::Settings;
pub use indexing::{FileFilter, SourceFilter, SourceWalker};
pub use retrieve::{IndexMode, IndexReport, RetrieveError, Retriever};
pub use semantic::{EmbeddingCache, EmbeddingError, EmbeddingGenerator, FastEmbedGenerator};
pub use types::*;
pub use vector::{IndexConfig, IndexVariant, VectorStore, VectorStoreError};

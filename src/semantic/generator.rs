//! Embedding capability trait and the fastembed-backed implementation.

use std::path::Path;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use super::{EmbeddingError, EmbeddingResult};

/// Model used when settings do not name one.
pub const DEFAULT_MODEL: &str = "AllMiniLML6V2";

/// A deterministic text → fixed-length vector function for one model.
///
/// Implementations must return identical vectors for identical text under
/// the same `model_id`; the embedding cache relies on it.
pub trait EmbeddingGenerator: Send + Sync {
    /// Stable identity of the model, recorded in cache keys and index sidecars.
    fn model_id(&self) -> &str;

    /// Length of every vector this generator returns.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input in input order.
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;
}

/// Resolve a model name from settings.
pub fn model_from_name(name: &str) -> EmbeddingResult<EmbeddingModel> {
    let model = match name {
        "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
        "AllMiniLML6V2Q" => EmbeddingModel::AllMiniLML6V2Q,
        "AllMiniLML12V2" => EmbeddingModel::AllMiniLML12V2,
        "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
        "BGEBaseENV15" => EmbeddingModel::BGEBaseENV15,
        "BGELargeENV15" => EmbeddingModel::BGELargeENV15,
        "MultilingualE5Small" => EmbeddingModel::MultilingualE5Small,
        "MultilingualE5Base" => EmbeddingModel::MultilingualE5Base,
        "NomicEmbedTextV15" => EmbeddingModel::NomicEmbedTextV15,
        other => {
            return Err(EmbeddingError::Configuration(format!(
                "unknown embedding model '{other}'"
            )));
        }
    };
    Ok(model)
}

/// Canonical settings name of a model.
pub fn model_to_string(model: &EmbeddingModel) -> String {
    match model {
        EmbeddingModel::AllMiniLML6V2 => "AllMiniLML6V2",
        EmbeddingModel::AllMiniLML6V2Q => "AllMiniLML6V2Q",
        EmbeddingModel::AllMiniLML12V2 => "AllMiniLML12V2",
        EmbeddingModel::BGESmallENV15 => "BGESmallENV15",
        EmbeddingModel::BGEBaseENV15 => "BGEBaseENV15",
        EmbeddingModel::BGELargeENV15 => "BGELargeENV15",
        EmbeddingModel::MultilingualE5Small => "MultilingualE5Small",
        EmbeddingModel::MultilingualE5Base => "MultilingualE5Base",
        EmbeddingModel::NomicEmbedTextV15 => "NomicEmbedTextV15",
        other => return format!("{other:?}"),
    }
    .to_string()
}

/// Local ONNX embedding model via fastembed.
///
/// Construction downloads the model on first use and probes its dimension;
/// do it once at startup and share the generator.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    model_id: String,
    dimension: usize,
}

impl FastEmbedGenerator {
    /// Load the model named `model_name`, caching model files in `models_dir`.
    pub fn new(
        model_name: &str,
        models_dir: Option<&Path>,
        show_download_progress: bool,
    ) -> EmbeddingResult<Self> {
        let model = model_from_name(model_name)?;
        let model_id = model_to_string(&model);

        let mut options =
            InitOptions::new(model).with_show_download_progress(show_download_progress);
        if let Some(dir) = models_dir {
            options = options.with_cache_dir(dir.to_path_buf());
        }

        let mut text_model = TextEmbedding::try_new(options).map_err(|e| {
            EmbeddingError::Configuration(format!("failed to initialize {model_id}: {e}"))
        })?;

        let probe = text_model
            .embed(vec!["dimension probe"], None)
            .map_err(|e| EmbeddingError::Configuration(format!("{model_id} probe failed: {e}")))?;
        let dimension = probe.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(EmbeddingError::Configuration(format!(
                "{model_id} returned an empty probe embedding"
            )));
        }

        tracing::info!(
            target: "semantic",
            "Loaded embedding model {model_id} ({dimension} dimensions)"
        );

        Ok(Self {
            model: Mutex::new(text_model),
            model_id,
            dimension,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))
    }
}

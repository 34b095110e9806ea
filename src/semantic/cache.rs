//! Persistent embedding cache keyed by `(model identity, text)`.
//!
//! One file per entry under the cache root:
//!
//! ```text
//! <root>/<key[0..2]>/<key>.vec     key = sha256(model ∥ 0x00 ∥ text)
//! "QEMB" | u32 dimension (LE) | dimension × f32 (LE)
//! ```
//!
//! Changing the model changes every key, so old entries are simply never
//! read again. Cache I/O problems are logged and degrade to recomputation;
//! they never fail an embedding request.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::{EmbeddingError, EmbeddingGenerator, EmbeddingResult};

const RECORD_MAGIC: &[u8; 4] = b"QEMB";
const HEADER_LEN: usize = 8;

/// Default number of texts sent to the model per call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Cache key for `text` under `model_id` (lowercase hex sha256).
pub fn cache_key(model_id: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache I/O problems. Logged, never returned to callers.
#[derive(Error, Debug)]
pub(crate) enum CacheError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed cache entry {path}")]
    Malformed { path: PathBuf },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

/// Embedding front-end that memoizes vectors on disk.
pub struct EmbeddingCache {
    generator: Arc<dyn EmbeddingGenerator>,
    root: Option<PathBuf>,
    batch_size: usize,
    counters: Counters,
}

impl EmbeddingCache {
    /// Cache rooted at `root`, created if missing.
    ///
    /// If the directory cannot be created the cache runs disabled.
    pub fn new(generator: Arc<dyn EmbeddingGenerator>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = match fs::create_dir_all(&root) {
            Ok(()) => Some(root),
            Err(e) => {
                tracing::warn!(
                    target: "cache",
                    "Embedding cache unavailable at {}: {e}; continuing without caching",
                    root.display()
                );
                None
            }
        };
        Self {
            generator,
            root,
            batch_size: DEFAULT_BATCH_SIZE,
            counters: Counters::default(),
        }
    }

    /// Pass-through instance that never touches disk.
    pub fn disabled(generator: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            generator,
            root: None,
            batch_size: DEFAULT_BATCH_SIZE,
            counters: Counters::default(),
        }
    }

    /// Limit how many texts are sent to the model per call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.generator.dimension()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Embed one text, consulting the cache first.
    pub fn embed_one(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let key = cache_key(self.model_id(), text);
        if let Some(vector) = self.read_entry(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(vector);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let vector = self
            .generate(&[text])?
            .pop()
            .ok_or_else(|| self.count_mismatch(1, 0))?;
        self.write_entry(&key, &vector);
        Ok(vector)
    }

    /// Embed many texts; only cache misses reach the model, in batches.
    ///
    /// Observably equivalent to calling [`embed_one`](Self::embed_one) per
    /// text. Repeated texts within one call are embedded once.
    pub fn embed_many(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        // key -> positions waiting for that vector
        let mut pending: HashMap<String, Vec<usize>> = HashMap::new();
        let mut order: Vec<(String, usize)> = Vec::new();

        for (idx, text) in texts.iter().enumerate() {
            let key = cache_key(self.model_id(), text);
            if let Some(waiting) = pending.get_mut(&key) {
                waiting.push(idx);
                continue;
            }
            match self.read_entry(&key) {
                Some(vector) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    results[idx] = Some(vector);
                }
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    pending.insert(key.clone(), vec![idx]);
                    order.push((key, idx));
                }
            }
        }

        if !order.is_empty() {
            tracing::debug!(
                target: "cache",
                "{} cached, {} to embed with {}",
                texts.len() - pending.values().map(Vec::len).sum::<usize>(),
                order.len(),
                self.model_id()
            );
        }

        for batch in order.chunks(self.batch_size) {
            let batch_texts: Vec<&str> = batch.iter().map(|(_, idx)| texts[*idx]).collect();
            let vectors = self.generate(&batch_texts)?;
            for ((key, _), vector) in batch.iter().zip(vectors) {
                self.write_entry(key, &vector);
                if let Some(positions) = pending.get(key) {
                    for &pos in positions {
                        results[pos] = Some(vector.clone());
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|slot| slot.ok_or_else(|| self.count_mismatch(texts.len(), 0)))
            .collect()
    }

    fn generate(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let vectors = self.generator.embed_batch(texts)?;
        if vectors.len() != texts.len() {
            return Err(self.count_mismatch(texts.len(), vectors.len()));
        }
        let expected = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                model: self.model_id().to_string(),
                expected,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }

    fn count_mismatch(&self, expected: usize, actual: usize) -> EmbeddingError {
        EmbeddingError::CountMismatch {
            model: self.model_id().to_string(),
            expected,
            actual,
        }
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        Some(root.join(&key[..2]).join(format!("{key}.vec")))
    }

    fn read_entry(&self, key: &str) -> Option<Vec<f32>> {
        let path = self.entry_path(key)?;
        match read_record(&path, self.dimension()) {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(target: "cache", "Ignoring cache entry: {e}");
                None
            }
        }
    }

    fn write_entry(&self, key: &str, vector: &[f32]) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        match write_record(&path, vector) {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(target: "cache", "Cache write failed: {e}");
            }
        }
    }
}

fn encode_record(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + vector.len() * 4);
    bytes.extend_from_slice(RECORD_MAGIC);
    bytes.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_record(bytes: &[u8], expected_dimension: usize) -> Option<Vec<f32>> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != RECORD_MAGIC {
        return None;
    }
    let dimension = u32::from_le_bytes(bytes[4..8].try_into().ok()?) as usize;
    if dimension != expected_dimension || bytes.len() != HEADER_LEN + dimension * 4 {
        return None;
    }
    Some(
        bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// `Ok(None)` when no entry exists.
fn read_record(path: &Path, dimension: usize) -> Result<Option<Vec<f32>>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    decode_record(&bytes, dimension)
        .map(Some)
        .ok_or_else(|| CacheError::Malformed {
            path: path.to_path_buf(),
        })
}

/// Write atomically: readers see either no entry or a complete one.
fn write_record(path: &Path, vector: &[f32]) -> Result<(), CacheError> {
    let dir = path.parent().ok_or_else(|| CacheError::Malformed {
        path: path.to_path_buf(),
    })?;
    fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
    let mut file = NamedTempFile::new_in(dir).map_err(|e| CacheError::io(dir, e))?;
    file.write_all(&encode_record(vector))
        .map_err(|e| CacheError::io(file.path(), e))?;
    file.persist(path).map_err(|e| CacheError::io(path, e.error))?;
    Ok(())
}

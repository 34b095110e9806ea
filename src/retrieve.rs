//! Retriever: source tree → fragments → embeddings → vector store, and back
//! from query text to ranked fragments.
//!
//! This is the only component that knows both directions. It decides
//! between a fresh build and an incremental append based solely on whether
//! a saved store already exists.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::chunking::ChunkerRegistry;
use crate::config::Settings;
use crate::indexing::{FileFilter, SourceWalker, in_excluded_dir};
use crate::semantic::{CacheStats, EmbeddingCache, EmbeddingError, EmbeddingGenerator};
use crate::types::{Fragment, ScoredFragment};
use crate::vector::{IndexConfig, VectorDimension, VectorStore, VectorStoreError};

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] VectorStoreError),

    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("{} is outside the indexed root {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RetrieveError {
    /// Settings must change before retrying (model name, model mismatch).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Embedding(e) if e.is_configuration())
    }

    /// No index has been built yet.
    pub fn is_first_run(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_first_run())
    }

    /// The saved index is unusable and must be rebuilt.
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, Self::Store(e) if e.needs_rebuild())
    }
}

pub type RetrieveResult<T> = Result<T, RetrieveError>;

/// How an indexing run changed the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// A new store was built from scratch.
    Build,
    /// Entries were appended to a saved store.
    Append,
}

impl fmt::Display for IndexMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => f.write_str("build"),
            Self::Append => f.write_str("append"),
        }
    }
}

/// Summary of one `index_source_tree` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Eligible files found.
    pub files_seen: usize,
    /// Files that produced at least one fragment.
    pub files_chunked: usize,
    /// Fragments produced by the chunkers.
    pub fragments: usize,
    /// Fragments embedded and written to the store.
    pub embedded: usize,
    /// Fragments dropped because their text was blank.
    pub skipped_blank: usize,
    /// Fragments already present in the store with identical path and text.
    pub skipped_existing: usize,
    /// Entries in the store after the run.
    pub total: usize,
    pub mode: IndexMode,
    pub cache: CacheStats,
}

pub struct Retriever {
    root: PathBuf,
    index_path: PathBuf,
    index_config: IndexConfig,
    chunkers: ChunkerRegistry,
    walker: SourceWalker,
    embedder: EmbeddingCache,
    store: Option<VectorStore>,
}

impl fmt::Debug for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retriever")
            .field("root", &self.root)
            .field("index_path", &self.index_path)
            .field("model", &self.embedder.model_id())
            .field("store", &self.store)
            .finish()
    }
}

impl Retriever {
    /// A retriever over `root` with no store loaded yet.
    pub fn new(
        root: impl AsRef<Path>,
        index_path: impl Into<PathBuf>,
        embedder: EmbeddingCache,
        index_config: IndexConfig,
    ) -> RetrieveResult<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|_| RetrieveError::PathNotFound(root.to_path_buf()))?;
        let index_path = index_path.into();

        let mut walker =
            SourceWalker::new(Default::default(), Vec::new()).exclude_generated(&index_path);
        if let Some(cache_root) = embedder.root() {
            walker = walker.exclude_generated(cache_root);
        }

        Ok(Self {
            root,
            index_path,
            index_config,
            chunkers: ChunkerRegistry::with_defaults(),
            walker,
            embedder,
            store: None,
        })
    }

    /// Open a retriever over `root`, loading the store at `index_path` if
    /// one was saved there.
    ///
    /// Fails with a configuration error when the saved store was built with
    /// a different embedding model.
    pub fn open(
        root: impl AsRef<Path>,
        index_path: impl Into<PathBuf>,
        embedder: EmbeddingCache,
        index_config: IndexConfig,
    ) -> RetrieveResult<Self> {
        Self::new(root, index_path, embedder, index_config)?.with_saved_store()
    }

    /// Build from [`Settings`] paths, walker rules and index parameters
    /// without touching the saved store.
    pub fn configured(
        settings: &Settings,
        generator: Arc<dyn EmbeddingGenerator>,
    ) -> RetrieveResult<Self> {
        let root = settings
            .workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let index_path = settings.resolve(&settings.index_path);
        let cache_dir = settings.resolve(&settings.cache_dir);

        let embedder = EmbeddingCache::new(generator, &cache_dir)
            .with_batch_size(settings.semantic.batch_size);
        let walker = SourceWalker::from_config(&settings.indexing)
            .exclude_generated(&index_path)
            .exclude_generated(&cache_dir);

        let retriever = Self::new(root, index_path, embedder, settings.vector.index_config())?;
        Ok(retriever.with_walker(walker))
    }

    /// [`Retriever::configured`] plus the saved store, if any.
    pub fn from_settings(
        settings: &Settings,
        generator: Arc<dyn EmbeddingGenerator>,
    ) -> RetrieveResult<Self> {
        Self::configured(settings, generator)?.with_saved_store()
    }

    /// Load the store saved at the index path, if there is one.
    pub fn with_saved_store(mut self) -> RetrieveResult<Self> {
        self.store = self.load_existing()?;
        Ok(self)
    }

    pub fn with_walker(mut self, walker: SourceWalker) -> Self {
        self.walker = walker;
        self
    }

    pub fn with_chunkers(mut self, chunkers: ChunkerRegistry) -> Self {
        self.chunkers = chunkers;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn store(&self) -> Option<&VectorStore> {
        self.store.as_ref()
    }

    pub fn embedder(&self) -> &EmbeddingCache {
        &self.embedder
    }

    /// Index `paths` (files or directories; the root when empty).
    ///
    /// Builds a new store on the first run and appends to the saved store
    /// afterwards, then saves.
    pub fn index_source_tree(&mut self, paths: &[PathBuf]) -> RetrieveResult<IndexReport> {
        self.run(paths)
    }

    /// Discard the current store and build a fresh one from `paths`.
    pub fn rebuild(&mut self, paths: &[PathBuf]) -> RetrieveResult<IndexReport> {
        self.store = None;
        self.run(paths)
    }

    /// Up to `k` fragments most similar to `text`, best first.
    pub fn query(&self, text: &str, k: usize) -> RetrieveResult<Vec<ScoredFragment>> {
        let store = self.store.as_ref().ok_or(VectorStoreError::NotBuilt)?;
        let query = self.embedder.embed_one(text)?;
        let hits = store.search(&query, k)?;

        tracing::debug!(target: "retrieve", "Query returned {} of k={k} hits", hits.len());
        Ok(hits
            .into_iter()
            .map(|hit| ScoredFragment::new(hit.fragment, hit.score.get()))
            .collect())
    }

    fn run(&mut self, paths: &[PathBuf]) -> RetrieveResult<IndexReport> {
        let files = self.collect_files(paths)?;
        let known: HashSet<(String, String)> = self
            .store
            .as_ref()
            .map(|store| store.fragments().iter().map(fragment_key).collect())
            .unwrap_or_default();

        let mut files_chunked = 0;
        let mut produced = 0;
        let mut skipped_blank = 0;
        let mut skipped_existing = 0;
        let mut fragments: Vec<Fragment> = Vec::new();

        for file in &files {
            let Some(content) = read_text(file)? else {
                continue;
            };
            let relative = self.relative_path(file);
            let chunks = self.chunkers.chunk(&content, &relative);
            if !chunks.is_empty() {
                files_chunked += 1;
            }
            produced += chunks.len();

            for fragment in chunks {
                if fragment.is_blank() {
                    skipped_blank += 1;
                } else if known.contains(&fragment_key(&fragment)) {
                    skipped_existing += 1;
                } else {
                    fragments.push(fragment);
                }
            }
        }

        tracing::info!(
            target: "retrieve",
            "Chunked {} files into {} fragments ({} to embed)",
            files_chunked,
            produced,
            fragments.len()
        );

        let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        let vectors = self.embedder.embed_many(&texts)?;
        let embedded = vectors.len();

        let mode = if let Some(store) = self.store.as_mut() {
            store.incremental_update(vectors, fragments)?;
            IndexMode::Append
        } else {
            let mut store = VectorStore::new(self.dimension()?, self.index_config)
                .with_model(self.embedder.model_id());
            store.build(vectors, fragments)?;
            self.store = Some(store);
            IndexMode::Build
        };

        let store = self.store.as_mut().ok_or(VectorStoreError::NotBuilt)?;
        store.save(&self.index_path)?;

        Ok(IndexReport {
            files_seen: files.len(),
            files_chunked,
            fragments: produced,
            embedded,
            skipped_blank,
            skipped_existing,
            total: store.len(),
            mode,
            cache: self.embedder.stats(),
        })
    }

    fn load_existing(&self) -> RetrieveResult<Option<VectorStore>> {
        if !VectorStore::exists(&self.index_path) {
            return Ok(None);
        }
        let store = VectorStore::open(&self.index_path, self.index_config)?;

        let configured = self.embedder.model_id();
        if let Some(saved) = store.model().filter(|saved| *saved != configured) {
            return Err(EmbeddingError::Configuration(format!(
                "index at {} was built with model {saved} but {configured} is configured; \
                 switch the model back or rebuild the index",
                self.index_path.display()
            ))
            .into());
        }
        let dimension = self.dimension()?;
        if store.dimension() != dimension {
            return Err(VectorStoreError::IndexDimensionMismatch {
                path: self.index_path.clone(),
                expected: dimension.get(),
                actual: store.dimension().get(),
            }
            .into());
        }
        Ok(Some(store))
    }

    fn dimension(&self) -> RetrieveResult<VectorDimension> {
        VectorDimension::new(self.embedder.dimension()).map_err(|_| {
            EmbeddingError::Configuration(format!(
                "model {} reports a zero dimension",
                self.embedder.model_id()
            ))
            .into()
        })
    }

    /// Eligible files under `paths`, deduplicated and sorted.
    fn collect_files(&self, paths: &[PathBuf]) -> RetrieveResult<Vec<PathBuf>> {
        let roots: Vec<PathBuf> = if paths.is_empty() {
            vec![self.root.clone()]
        } else {
            paths.to_vec()
        };

        let mut files = Vec::new();
        for path in roots {
            let path = if path.is_relative() && !path.exists() {
                self.root.join(&path)
            } else {
                path
            };
            if path.is_dir() {
                files.extend(self.walker.walk(&path));
            } else if path.is_file() {
                let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                if !in_excluded_dir(relative) && self.walker.filter().accepts(&path) {
                    files.push(path);
                } else {
                    tracing::debug!(target: "retrieve", "Skipping ineligible {}", path.display());
                }
            } else {
                return Err(RetrieveError::PathNotFound(path));
            }
        }

        let mut files: Vec<PathBuf> = files
            .into_iter()
            .map(|file| file.canonicalize().unwrap_or(file))
            .collect();
        if let Some(outside) = files.iter().find(|file| !file.starts_with(&self.root)) {
            return Err(RetrieveError::OutsideRoot {
                path: outside.clone(),
                root: self.root.clone(),
            });
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// `/`-separated path relative to the root.
    fn relative_path(&self, file: &Path) -> String {
        let relative = file.strip_prefix(&self.root).unwrap_or(file);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Identity used to skip fragments already in the store.
fn fragment_key(fragment: &Fragment) -> (String, String) {
    (fragment.path.clone(), fragment.hash.as_str().to_string())
}

/// File contents as UTF-8; `None` (with a warning) for non-UTF-8 files.
fn read_text(path: &Path) -> RetrieveResult<Option<String>> {
    let bytes = fs::read(path).map_err(|source| RetrieveError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(Some(text)),
        Err(_) => {
            tracing::warn!(target: "retrieve", "Skipping non-UTF-8 file {}", path.display());
            Ok(None)
        }
    }
}

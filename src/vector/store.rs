//! Vector store: ANN index and fragment metadata as one owning arena.
//!
//! Entry `n` of the index and `fragments[n]` always describe the same
//! logical entry. The only ways to add entries are [`VectorStore::build`]
//! and [`VectorStore::incremental_update`], both of which take vectors and
//! fragments together and append them in lockstep.

use std::fmt;
use std::fs;
use std::path::Path;

use super::ann::{AnnIndex, FlatIndex};
use super::blob::{self, DecodedBlob};
use super::ivf::{IvfFlatIndex, IvfParams};
use super::manifest::{MANIFEST_VERSION, StoreManifest, write_atomic};
use super::types::{IndexVariant, Score, VectorDimension, VectorId, normalize};
use super::{VectorStoreError, VectorStoreResult};
use crate::types::Fragment;
use crate::utils::get_utc_timestamp;

/// File name of the index blob inside a store directory.
pub const INDEX_FILE: &str = "vectors.idx";

/// File name of the metadata sidecar inside a store directory.
pub const MANIFEST_FILE: &str = "vectors.meta.json";

/// Lifecycle of a store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Nothing built or loaded.
    Empty,
    /// Holds entries not yet written to disk.
    Built,
    /// In-memory contents match the artifacts last saved.
    Persisted,
    /// Contents came from disk.
    Loaded,
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Built => "built",
            Self::Persisted => "persisted",
            Self::Loaded => "loaded",
        };
        f.write_str(name)
    }
}

/// Backend selection for new stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexConfig {
    pub variant: IndexVariant,
    pub ivf: IvfParams,
}

impl IndexConfig {
    pub fn flat() -> Self {
        Self {
            variant: IndexVariant::Flat,
            ivf: IvfParams::default(),
        }
    }

    pub fn ivf_flat(ivf: IvfParams) -> Self {
        Self {
            variant: IndexVariant::IvfFlat,
            ivf,
        }
    }

    fn build_index(
        &self,
        dimension: VectorDimension,
        vectors: &[Vec<f32>],
    ) -> Box<dyn AnnIndex> {
        match self.variant {
            IndexVariant::Flat => {
                let mut index = FlatIndex::new(dimension);
                index.reserve(vectors.len());
                index.add(vectors);
                Box::new(index)
            }
            IndexVariant::IvfFlat => Box::new(IvfFlatIndex::train(dimension, self.ivf, vectors)),
        }
    }

    fn restore_index(&self, decoded: DecodedBlob) -> Box<dyn AnnIndex> {
        match decoded.variant {
            IndexVariant::Flat => Box::new(FlatIndex::from_blob(decoded)),
            IndexVariant::IvfFlat => Box::new(IvfFlatIndex::from_blob(decoded, self.ivf.probes)),
        }
    }
}

/// One search result borrowed from the store.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub id: VectorId,
    pub score: Score,
    pub fragment: &'a Fragment,
}

pub struct VectorStore {
    dimension: VectorDimension,
    config: IndexConfig,
    model: Option<String>,
    index: Option<Box<dyn AnnIndex>>,
    fragments: Vec<Fragment>,
    state: StoreState,
    created_at: u64,
}

impl fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStore")
            .field("dimension", &self.dimension)
            .field("variant", &self.variant())
            .field("model", &self.model)
            .field("len", &self.len())
            .field("state", &self.state)
            .finish()
    }
}

impl VectorStore {
    /// An empty store for vectors of `dimension`.
    pub fn new(dimension: VectorDimension, config: IndexConfig) -> Self {
        Self {
            dimension,
            config,
            model: None,
            index: None,
            fragments: Vec::new(),
            state: StoreState::Empty,
            created_at: get_utc_timestamp(),
        }
    }

    /// Record the embedding model identity in saved sidecars.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Whether a sidecar exists at `location`.
    pub fn exists(location: &Path) -> bool {
        location.join(MANIFEST_FILE).is_file()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Backend in use; the configured one until something is built or loaded.
    pub fn variant(&self) -> IndexVariant {
        self.index
            .as_ref()
            .map(|index| index.variant())
            .unwrap_or(self.config.variant)
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn fragment(&self, id: VectorId) -> Option<&Fragment> {
        self.fragments.get(id.index())
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Create the index from scratch. Ids are `0..n` in input order.
    ///
    /// Only valid on an [`StoreState::Empty`] store; rebuilding means
    /// starting from a new store.
    pub fn build(
        &mut self,
        vectors: Vec<Vec<f32>>,
        fragments: Vec<Fragment>,
    ) -> VectorStoreResult<Vec<VectorId>> {
        if self.state != StoreState::Empty {
            return Err(VectorStoreError::InvalidState {
                operation: "build",
                state: self.state,
            });
        }
        let vectors = self.prepare(vectors, &fragments)?;

        let index = self.config.build_index(self.dimension, &vectors);
        let ids = (0..index.len() as u32).map(VectorId::new).collect();
        debug_assert_eq!(index.len(), fragments.len());

        tracing::info!(
            target: "vector",
            "Built {} index with {} vectors ({} dimensions)",
            index.variant(),
            index.len(),
            self.dimension
        );

        self.index = Some(index);
        self.fragments = fragments;
        self.state = StoreState::Built;
        Ok(ids)
    }

    /// Append entries; ids continue from the current count.
    pub fn incremental_update(
        &mut self,
        vectors: Vec<Vec<f32>>,
        fragments: Vec<Fragment>,
    ) -> VectorStoreResult<Vec<VectorId>> {
        let next_state = match self.state {
            StoreState::Empty => return Err(VectorStoreError::NotBuilt),
            StoreState::Loaded => StoreState::Loaded,
            StoreState::Built | StoreState::Persisted => StoreState::Built,
        };
        let vectors = self.prepare(vectors, &fragments)?;
        let index = self.index.as_mut().ok_or(VectorStoreError::NotBuilt)?;

        let first = index.len();
        index.reserve(vectors.len());
        self.fragments.reserve(fragments.len());
        let ids = index.add(&vectors);
        self.fragments.extend(fragments);
        debug_assert_eq!(index.len(), self.fragments.len());
        debug_assert!(ids.first().is_none_or(|id| id.index() == first));

        tracing::info!(
            target: "vector",
            "Appended {} vectors (total {})",
            ids.len(),
            self.fragments.len()
        );

        self.state = next_state;
        Ok(ids)
    }

    /// Write `vectors.idx` then `vectors.meta.json` into `location`.
    ///
    /// The sidecar is written last, so a reader that finds it also finds a
    /// complete blob from the same save.
    pub fn save(&mut self, location: &Path) -> VectorStoreResult<()> {
        let index = match (&self.index, self.state) {
            (_, StoreState::Empty) | (None, _) => return Err(VectorStoreError::NotBuilt),
            (Some(index), _) => index,
        };

        fs::create_dir_all(location)?;
        write_atomic(&location.join(INDEX_FILE), &index.encode())?;

        let manifest = StoreManifest {
            version: MANIFEST_VERSION,
            variant: index.variant(),
            dimension: self.dimension.get(),
            count: index.len(),
            model: self.model.clone(),
            created_at: self.created_at,
            updated_at: get_utc_timestamp(),
            fragments: self.fragments.clone(),
        };
        manifest.save(&location.join(MANIFEST_FILE))?;

        tracing::info!(
            target: "vector",
            "Saved {} vectors to {}",
            manifest.count,
            location.display()
        );
        self.state = StoreState::Persisted;
        Ok(())
    }

    /// Replace the contents with the index saved at `location`.
    ///
    /// The sidecar is read first and every declared property is checked
    /// against the blob; nothing is truncated or padded to make them agree.
    pub fn load(&mut self, location: &Path) -> VectorStoreResult<()> {
        let manifest_path = location.join(MANIFEST_FILE);
        let blob_path = location.join(INDEX_FILE);

        let manifest = StoreManifest::load(&manifest_path)?;
        if manifest.dimension != self.dimension.get() {
            return Err(VectorStoreError::IndexDimensionMismatch {
                path: location.to_path_buf(),
                expected: self.dimension.get(),
                actual: manifest.dimension,
            });
        }

        let decoded = blob::read_blob(&blob_path)?;
        check_agreement(&manifest, &decoded, &blob_path)?;

        if decoded.variant != self.config.variant {
            tracing::debug!(
                target: "vector",
                "Loaded {} index while {} is configured",
                decoded.variant,
                self.config.variant
            );
        }

        let index = self.config.restore_index(decoded);
        tracing::info!(
            target: "vector",
            "Loaded {} vectors from {}",
            index.len(),
            location.display()
        );

        self.index = Some(index);
        self.fragments = manifest.fragments;
        self.model = manifest.model;
        self.created_at = manifest.created_at;
        self.state = StoreState::Loaded;
        Ok(())
    }

    /// Open the store saved at `location`.
    pub fn open(location: &Path, config: IndexConfig) -> VectorStoreResult<Self> {
        let manifest = StoreManifest::load(&location.join(MANIFEST_FILE))?;
        let dimension = VectorDimension::new(manifest.dimension).map_err(|_| {
            VectorStoreError::integrity(location.join(MANIFEST_FILE), "dimension is zero")
        })?;
        let mut store = Self::new(dimension, config);
        store.load(location)?;
        Ok(store)
    }

    /// Up to `k` entries nearest to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> VectorStoreResult<Vec<SearchHit<'_>>> {
        let index = match (&self.index, self.state) {
            (_, StoreState::Empty) | (None, _) => return Err(VectorStoreError::NotBuilt),
            (Some(index), _) => index,
        };
        self.dimension.validate_vector(query)?;

        let mut query = query.to_vec();
        normalize(&mut query);

        index
            .search(&query, k)
            .into_iter()
            .map(|(id, score)| {
                let fragment = self.fragments.get(id.index()).ok_or_else(|| {
                    VectorStoreError::InvalidState {
                        operation: "search",
                        state: self.state,
                    }
                })?;
                Ok(SearchHit {
                    id,
                    score,
                    fragment,
                })
            })
            .collect()
    }

    /// Check lengths and dimensions, then normalise.
    fn prepare(
        &self,
        mut vectors: Vec<Vec<f32>>,
        fragments: &[Fragment],
    ) -> VectorStoreResult<Vec<Vec<f32>>> {
        if vectors.len() != fragments.len() {
            return Err(VectorStoreError::LengthMismatch {
                vectors: vectors.len(),
                metadata: fragments.len(),
            });
        }
        for vector in &vectors {
            self.dimension.validate_vector(vector)?;
        }
        for vector in &mut vectors {
            normalize(vector);
        }
        Ok(vectors)
    }
}

/// Sidecar and blob must describe the same index.
fn check_agreement(
    manifest: &StoreManifest,
    decoded: &DecodedBlob,
    blob_path: &Path,
) -> VectorStoreResult<()> {
    if manifest.variant != decoded.variant {
        return Err(VectorStoreError::integrity(
            blob_path,
            format!(
                "sidecar declares a {} index but the blob holds {}",
                manifest.variant, decoded.variant
            ),
        ));
    }
    if manifest.dimension != decoded.dimension.get() {
        return Err(VectorStoreError::integrity(
            blob_path,
            format!(
                "sidecar declares dimension {} but the blob holds {}",
                manifest.dimension,
                decoded.dimension.get()
            ),
        ));
    }
    if manifest.count != decoded.count {
        return Err(VectorStoreError::integrity(
            blob_path,
            format!(
                "sidecar declares {} entries but the blob holds {}",
                manifest.count, decoded.count
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fragment(i: usize) -> Fragment {
        Fragment::new(
            format!("src/f{i}.rs"),
            "fn",
            format!("f{i}"),
            format!("fn f{i}() {{}}"),
            1,
            1,
        )
    }

    fn axis(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i % dim] = 1.0;
        v
    }

    fn flat_store(dim: usize) -> VectorStore {
        VectorStore::new(VectorDimension::new(dim).unwrap(), IndexConfig::flat())
    }

    #[test]
    fn test_operations_on_empty_store() {
        let mut store = flat_store(3);
        assert_eq!(store.state(), StoreState::Empty);
        assert!(matches!(
            store.search(&[1.0, 0.0, 0.0], 1),
            Err(VectorStoreError::NotBuilt)
        ));
        assert!(matches!(
            store.incremental_update(vec![axis(3, 0)], vec![fragment(0)]),
            Err(VectorStoreError::NotBuilt)
        ));
        let temp_dir = TempDir::new().unwrap();
        assert!(store.save(temp_dir.path()).unwrap_err().is_first_run());
    }

    #[test]
    fn test_build_twice_is_rejected() {
        let mut store = flat_store(3);
        store.build(vec![axis(3, 0)], vec![fragment(0)]).unwrap();
        assert!(matches!(
            store.build(vec![axis(3, 1)], vec![fragment(1)]),
            Err(VectorStoreError::InvalidState {
                operation: "build",
                state: StoreState::Built
            })
        ));
    }

    #[test]
    fn test_failed_build_leaves_store_empty() {
        let mut store = flat_store(3);
        assert!(store.build(vec![vec![1.0]], vec![fragment(0)]).is_err());
        assert_eq!(store.state(), StoreState::Empty);
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_update_leaves_store_unchanged() {
        let mut store = flat_store(3);
        store.build(vec![axis(3, 0)], vec![fragment(0)]).unwrap();
        let err = store
            .incremental_update(vec![axis(3, 1), vec![1.0, 2.0]], vec![fragment(1), fragment(2)])
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_state_transitions() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = flat_store(3);
        store.build(vec![axis(3, 0)], vec![fragment(0)]).unwrap();
        assert_eq!(store.state(), StoreState::Built);

        store.save(temp_dir.path()).unwrap();
        assert_eq!(store.state(), StoreState::Persisted);

        store.incremental_update(vec![axis(3, 1)], vec![fragment(1)]).unwrap();
        assert_eq!(store.state(), StoreState::Built);
        store.save(temp_dir.path()).unwrap();

        let mut loaded = flat_store(3);
        loaded.load(temp_dir.path()).unwrap();
        assert_eq!(loaded.state(), StoreState::Loaded);
        loaded.incremental_update(vec![axis(3, 2)], vec![fragment(2)]).unwrap();
        assert_eq!(loaded.state(), StoreState::Loaded);
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn test_search_scores_and_metadata() {
        let mut store = flat_store(3);
        store
            .build(
                vec![vec![2.0, 0.0, 0.0], vec![0.0, 3.0, 0.0]],
                vec![fragment(0), fragment(1)],
            )
            .unwrap();

        let hits = store.search(&[0.0, 1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].fragment.name, "f1");
        assert!((hits[0].score.get() - 1.0).abs() < 1e-6);
        assert!((hits[1].score.get() - 0.5).abs() < 1e-6);

        assert!(matches!(
            store.search(&[1.0, 0.0], 1),
            Err(VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_load_into_wrong_dimension() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = flat_store(3);
        store.build(vec![axis(3, 0)], vec![fragment(0)]).unwrap();
        store.save(temp_dir.path()).unwrap();

        let mut other = flat_store(4);
        assert!(matches!(
            other.load(temp_dir.path()),
            Err(VectorStoreError::IndexDimensionMismatch {
                expected: 4,
                actual: 3,
                ..
            })
        ));
        assert_eq!(other.state(), StoreState::Empty);
    }

    #[test]
    fn test_open_adopts_saved_variant_and_model() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = flat_store(3).with_model("model-a");
        store.build(vec![axis(3, 0)], vec![fragment(0)]).unwrap();
        store.save(temp_dir.path()).unwrap();
        assert!(VectorStore::exists(temp_dir.path()));

        let opened = VectorStore::open(temp_dir.path(), IndexConfig::default()).unwrap();
        assert_eq!(opened.variant(), IndexVariant::Flat);
        assert_eq!(opened.model(), Some("model-a"));
        assert_eq!(opened.fragment(VectorId::new(0)), Some(&fragment(0)));
    }
}

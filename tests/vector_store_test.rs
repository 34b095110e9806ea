//! Integration tests for the vector store public API.

mod common;

use std::fs;

use common::{fragments, random_vectors};
use quarry::vector::{
    INDEX_FILE, IndexConfig, IndexVariant, IvfParams, MANIFEST_FILE, StoreState, VectorDimension,
    VectorId, VectorStore, VectorStoreError,
};
use tempfile::TempDir;

const DIM: usize = 16;

fn configs() -> Vec<IndexConfig> {
    vec![IndexConfig::flat(), IndexConfig::ivf_flat(IvfParams::default())]
}

fn built_store(n: usize, config: IndexConfig) -> (VectorStore, Vec<Vec<f32>>) {
    let vectors = random_vectors(n, DIM, 7);
    let mut store =
        VectorStore::new(VectorDimension::new(DIM).unwrap(), config).with_model("test-model");
    store.build(vectors.clone(), fragments(n, 0)).unwrap();
    (store, vectors)
}

#[test]
fn test_build_assigns_sequential_ids() {
    let mut store = VectorStore::new(VectorDimension::new(DIM).unwrap(), IndexConfig::flat());
    let ids = store.build(random_vectors(5, DIM, 1), fragments(5, 0)).unwrap();

    let expected: Vec<VectorId> = (0..5).map(VectorId::new).collect();
    assert_eq!(ids, expected);
    assert_eq!(store.len(), 5);
    assert_eq!(store.state(), StoreState::Built);
    assert_eq!(store.fragment(VectorId::new(3)).unwrap().name, "func_3");
}

#[test]
fn test_build_rejects_length_mismatch() {
    let mut store = VectorStore::new(VectorDimension::new(DIM).unwrap(), IndexConfig::flat());
    let err = store
        .build(random_vectors(3, DIM, 1), fragments(2, 0))
        .unwrap_err();
    assert!(matches!(
        err,
        VectorStoreError::LengthMismatch {
            vectors: 3,
            metadata: 2
        }
    ));
    assert_eq!(store.state(), StoreState::Empty);
}

#[test]
fn test_build_rejects_wrong_dimension() {
    let mut store = VectorStore::new(VectorDimension::new(DIM).unwrap(), IndexConfig::flat());
    let mut vectors = random_vectors(3, DIM, 1);
    vectors[1].pop();

    let err = store.build(vectors, fragments(3, 0)).unwrap_err();
    assert!(matches!(
        err,
        VectorStoreError::DimensionMismatch {
            expected: DIM,
            actual: 15
        }
    ));
    // bad input, not a damaged index
    assert!(!err.needs_rebuild());
}

#[test]
fn test_build_twice_is_rejected() {
    let (mut store, _) = built_store(4, IndexConfig::flat());
    let err = store.build(random_vectors(1, DIM, 2), fragments(1, 0)).unwrap_err();
    assert!(matches!(err, VectorStoreError::InvalidState { operation: "build", .. }));
}

#[test]
fn test_every_vector_finds_itself() {
    for config in configs() {
        let (store, vectors) = built_store(200, config);
        for (i, vector) in vectors.iter().enumerate() {
            let hits = store.search(vector, 1).unwrap();
            assert_eq!(hits[0].id.index(), i, "{} self-match failed for {i}", config.variant);
            assert!(hits[0].score.get() >= 0.99);
        }
    }
}

#[test]
fn test_results_are_ranked_and_bounded() {
    let (store, vectors) = built_store(20, IndexConfig::flat());

    let hits = store.search(&vectors[0], 5).unwrap();
    assert_eq!(hits.len(), 5);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score.get())));

    let all = store.search(&vectors[0], 100).unwrap();
    assert_eq!(all.len(), 20);
    assert!(store.search(&vectors[0], 0).unwrap().is_empty());
}

#[test]
fn test_search_before_build_is_not_built() {
    let store = VectorStore::new(VectorDimension::new(DIM).unwrap(), IndexConfig::flat());
    let err = store.search(&vec![0.5; DIM], 3).unwrap_err();
    assert!(matches!(err, VectorStoreError::NotBuilt));
    assert!(err.is_first_run());
}

#[test]
fn test_query_dimension_is_checked() {
    let (store, _) = built_store(4, IndexConfig::flat());
    let err = store.search(&[1.0, 0.0], 3).unwrap_err();
    assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
    assert!(!err.needs_rebuild());
}

#[test]
fn test_save_and_load_preserve_results() {
    for config in configs() {
        let temp_dir = TempDir::new().unwrap();
        let location = temp_dir.path().join("index");
        let (mut store, vectors) = built_store(120, config);
        store.save(&location).unwrap();
        assert_eq!(store.state(), StoreState::Persisted);
        assert!(VectorStore::exists(&location));

        let loaded = VectorStore::open(&location, config).unwrap();
        assert_eq!(loaded.state(), StoreState::Loaded);
        assert_eq!(loaded.len(), 120);
        assert_eq!(loaded.variant(), config.variant);
        assert_eq!(loaded.model(), Some("test-model"));

        for query in vectors.iter().step_by(17) {
            let before: Vec<_> = store
                .search(query, 10)
                .unwrap()
                .into_iter()
                .map(|h| (h.id, h.score, h.fragment.name.clone()))
                .collect();
            let after: Vec<_> = loaded
                .search(query, 10)
                .unwrap()
                .into_iter()
                .map(|h| (h.id, h.score, h.fragment.name.clone()))
                .collect();
            assert_eq!(before, after);
        }
    }
}

#[test]
fn test_load_adopts_saved_variant() {
    let temp_dir = TempDir::new().unwrap();
    let (mut store, vectors) = built_store(100, IndexConfig::ivf_flat(IvfParams::default()));
    store.save(temp_dir.path()).unwrap();

    let loaded = VectorStore::open(temp_dir.path(), IndexConfig::flat()).unwrap();
    assert_eq!(loaded.variant(), IndexVariant::IvfFlat);
    assert_eq!(loaded.search(&vectors[42], 1).unwrap()[0].id, VectorId::new(42));
}

#[test]
fn test_incremental_update_continues_ids() {
    for config in configs() {
        let temp_dir = TempDir::new().unwrap();
        let (mut store, _) = built_store(5, config);
        store.save(temp_dir.path()).unwrap();

        let extra = random_vectors(2, DIM, 99);
        let ids = store.incremental_update(extra.clone(), fragments(2, 5)).unwrap();
        assert_eq!(ids, vec![VectorId::new(5), VectorId::new(6)]);
        assert_eq!(store.len(), 7);
        assert_eq!(store.state(), StoreState::Built);

        for (offset, vector) in extra.iter().enumerate() {
            let hit = &store.search(vector, 1).unwrap()[0];
            assert_eq!(hit.id.index(), 5 + offset);
            assert_eq!(hit.fragment.name, format!("func_{}", 5 + offset));
        }

        store.save(temp_dir.path()).unwrap();
        let reloaded = VectorStore::open(temp_dir.path(), config).unwrap();
        assert_eq!(reloaded.len(), 7);
        assert_eq!(reloaded.search(&extra[1], 1).unwrap()[0].id, VectorId::new(6));
    }
}

#[test]
fn test_incremental_update_on_loaded_store() {
    let temp_dir = TempDir::new().unwrap();
    let (mut store, _) = built_store(10, IndexConfig::flat());
    store.save(temp_dir.path()).unwrap();

    let mut loaded = VectorStore::open(temp_dir.path(), IndexConfig::flat()).unwrap();
    let ids = loaded
        .incremental_update(random_vectors(1, DIM, 3), fragments(1, 10))
        .unwrap();
    assert_eq!(ids, vec![VectorId::new(10)]);
    assert_eq!(loaded.state(), StoreState::Loaded);
}

#[test]
fn test_incremental_update_requires_a_store() {
    let mut store = VectorStore::new(VectorDimension::new(DIM).unwrap(), IndexConfig::flat());
    let err = store
        .incremental_update(random_vectors(1, DIM, 3), fragments(1, 0))
        .unwrap_err();
    assert!(err.is_first_run());
}

#[test]
fn test_missing_index_is_first_run() {
    let temp_dir = TempDir::new().unwrap();
    let err = VectorStore::open(temp_dir.path(), IndexConfig::flat()).unwrap_err();
    assert!(matches!(err, VectorStoreError::MissingArtifact { .. }));
    assert!(err.is_first_run());
    assert!(!err.needs_rebuild());
}

#[test]
fn test_truncated_blob_needs_rebuild() {
    let temp_dir = TempDir::new().unwrap();
    let (mut store, _) = built_store(30, IndexConfig::flat());
    store.save(temp_dir.path()).unwrap();

    let blob = temp_dir.path().join(INDEX_FILE);
    let bytes = fs::read(&blob).unwrap();
    fs::write(&blob, &bytes[..bytes.len() / 2]).unwrap();

    let err = VectorStore::open(temp_dir.path(), IndexConfig::flat()).unwrap_err();
    assert!(matches!(err, VectorStoreError::Integrity { .. }), "{err}");
    assert!(err.needs_rebuild());
}

#[test]
fn test_missing_blob_beside_sidecar_needs_rebuild() {
    let temp_dir = TempDir::new().unwrap();
    let (mut store, _) = built_store(3, IndexConfig::flat());
    store.save(temp_dir.path()).unwrap();
    fs::remove_file(temp_dir.path().join(INDEX_FILE)).unwrap();

    let err = VectorStore::open(temp_dir.path(), IndexConfig::flat()).unwrap_err();
    assert!(err.needs_rebuild());
    assert!(!err.is_first_run());
}

#[test]
fn test_sidecar_count_mismatch_needs_rebuild() {
    let temp_dir = TempDir::new().unwrap();
    let (mut store, _) = built_store(6, IndexConfig::flat());
    store.save(temp_dir.path()).unwrap();

    let sidecar = temp_dir.path().join(MANIFEST_FILE);
    let mut json: serde_json::Value = serde_json::from_slice(&fs::read(&sidecar).unwrap()).unwrap();
    json["count"] = serde_json::json!(7);
    fs::write(&sidecar, serde_json::to_vec(&json).unwrap()).unwrap();

    let err = VectorStore::open(temp_dir.path(), IndexConfig::flat()).unwrap_err();
    assert!(matches!(err, VectorStoreError::Integrity { .. }), "{err}");
}

#[test]
fn test_sidecar_and_blob_disagree_on_count() {
    let temp_dir = TempDir::new().unwrap();
    let other_dir = TempDir::new().unwrap();

    let (mut small, _) = built_store(4, IndexConfig::flat());
    small.save(temp_dir.path()).unwrap();
    let (mut large, _) = built_store(9, IndexConfig::flat());
    large.save(other_dir.path()).unwrap();

    // sidecar says 4, blob holds 9
    fs::copy(other_dir.path().join(INDEX_FILE), temp_dir.path().join(INDEX_FILE)).unwrap();

    let err = VectorStore::open(temp_dir.path(), IndexConfig::flat()).unwrap_err();
    assert!(err.needs_rebuild(), "{err}");
}

#[test]
fn test_load_with_other_dimension_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let (mut store, _) = built_store(3, IndexConfig::flat());
    store.save(temp_dir.path()).unwrap();

    let mut other = VectorStore::new(VectorDimension::new(8).unwrap(), IndexConfig::flat());
    let err = other.load(temp_dir.path()).unwrap_err();
    assert!(matches!(
        err,
        VectorStoreError::IndexDimensionMismatch {
            expected: 8,
            actual: DIM,
            ..
        }
    ));
    assert!(err.needs_rebuild());
    assert_eq!(other.state(), StoreState::Empty);
}

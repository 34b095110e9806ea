//! ANN backend capability and the exhaustive flat backend.

use super::blob::{self, BlobHeader, DecodedBlob};
use super::types::{IndexVariant, Score, VectorDimension, VectorId, dot};

/// Approximate nearest-neighbor structure over unit-length vectors.
///
/// Backends only see vectors; fragment metadata lives in
/// [`VectorStore`](super::VectorStore), which is the only caller. Every
/// vector passed to `add` has already been validated and normalised.
pub trait AnnIndex: Send + Sync {
    fn variant(&self) -> IndexVariant;

    fn dimension(&self) -> VectorDimension;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow backing storage for `additional` more vectors.
    fn reserve(&mut self, additional: usize);

    /// Append vectors; ids continue from the current length, in input order.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Vec<VectorId>;

    /// At most `k` hits, best first, ties broken by ascending id.
    fn search(&self, query: &[f32], k: usize) -> Vec<(VectorId, Score)>;

    /// Serialise to the `vectors.idx` blob format.
    fn encode(&self) -> Vec<u8>;
}

/// Contiguous row-major vector storage; row `n` is vector id `n`.
#[derive(Debug, Clone)]
pub(crate) struct VectorRows {
    dimension: VectorDimension,
    values: Vec<f32>,
}

impl VectorRows {
    pub(crate) fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            values: Vec::new(),
        }
    }

    pub(crate) fn from_values(dimension: VectorDimension, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len() % dimension.get(), 0);
        Self { dimension, values }
    }

    pub(crate) fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len() / self.dimension.get()
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional * self.dimension.get());
    }

    pub(crate) fn push(&mut self, vector: &[f32]) -> VectorId {
        let id = VectorId::new(self.len() as u32);
        self.values.extend_from_slice(vector);
        id
    }

    pub(crate) fn row(&self, id: usize) -> &[f32] {
        let dim = self.dimension.get();
        &self.values[id * dim..(id + 1) * dim]
    }

    pub(crate) fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Keep the best `k` candidates, deterministic under equal scores.
pub(crate) fn rank(mut candidates: Vec<(VectorId, f32)>, k: usize) -> Vec<(VectorId, Score)> {
    candidates.sort_by(|(id_a, a), (id_b, b)| b.total_cmp(a).then_with(|| id_a.cmp(id_b)));
    candidates.truncate(k);
    candidates
        .into_iter()
        .map(|(id, cosine)| (id, Score::from_cosine(cosine)))
        .collect()
}

/// Exhaustive scan over every stored vector.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    rows: VectorRows,
}

impl FlatIndex {
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            rows: VectorRows::new(dimension),
        }
    }

    pub(crate) fn from_blob(decoded: DecodedBlob) -> Self {
        Self {
            rows: VectorRows::from_values(decoded.dimension, decoded.vectors),
        }
    }
}

impl AnnIndex for FlatIndex {
    fn variant(&self) -> IndexVariant {
        IndexVariant::Flat
    }

    fn dimension(&self) -> VectorDimension {
        self.rows.dimension()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn reserve(&mut self, additional: usize) {
        self.rows.reserve(additional);
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Vec<VectorId> {
        vectors.iter().map(|v| self.rows.push(v)).collect()
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(VectorId, Score)> {
        if k == 0 {
            return Vec::new();
        }
        let candidates = (0..self.rows.len())
            .map(|id| (VectorId::new(id as u32), dot(query, self.rows.row(id))))
            .collect();
        rank(candidates, k)
    }

    fn encode(&self) -> Vec<u8> {
        let header = BlobHeader {
            variant: IndexVariant::Flat,
            dimension: self.rows.dimension().get(),
            count: self.rows.len(),
            nlist: 0,
        };
        blob::encode(&header, &[], &[], self.rows.values())
    }
}

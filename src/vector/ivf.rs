//! IVF-Flat backend: k-means centroids with inverted lists of raw vectors.
//!
//! Training runs once, at build time. Incremental additions are assigned to
//! the nearest existing centroid and never retrain, so ids and list
//! membership of existing entries are stable across appends.

use super::ann::{AnnIndex, VectorRows, rank};
use super::blob::{self, BlobHeader, DecodedBlob};
use super::kmeans::{KMeansParams, nearest_centroid, train};
use super::types::{ClusterId, IndexVariant, Score, VectorDimension, VectorId, dot};

/// Default number of lists scanned per query.
pub const DEFAULT_PROBES: usize = 4;

/// Below this many training vectors a single list is used.
pub const DEFAULT_MIN_TRAIN_SIZE: usize = 64;

/// IVF tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfParams {
    /// Number of lists; 0 picks about `sqrt(n)` at build time.
    pub clusters: usize,
    /// Lists scanned per query.
    pub probes: usize,
    /// Minimum build size before clustering is attempted.
    pub min_train_size: usize,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            clusters: 0,
            probes: DEFAULT_PROBES,
            min_train_size: DEFAULT_MIN_TRAIN_SIZE,
        }
    }
}

impl IvfParams {
    /// List count for a build over `n` vectors.
    pub fn list_count(&self, n: usize) -> usize {
        if n < self.min_train_size.max(2) {
            return 1;
        }
        let wanted = if self.clusters == 0 {
            (n as f64).sqrt().round() as usize
        } else {
            self.clusters
        };
        wanted.clamp(1, n)
    }
}

#[derive(Debug, Clone)]
pub struct IvfFlatIndex {
    rows: VectorRows,
    centroids: VectorRows,
    assignments: Vec<ClusterId>,
    lists: Vec<Vec<VectorId>>,
    probes: usize,
}

impl IvfFlatIndex {
    /// Train centroids on `vectors` and index them as ids `0..n`.
    pub fn train(dimension: VectorDimension, params: IvfParams, vectors: &[Vec<f32>]) -> Self {
        let nlist = params.list_count(vectors.len());
        let centroids = if nlist <= 1 {
            single_centroid(dimension, vectors)
        } else {
            train(dimension, vectors, KMeansParams::new(nlist))
        };

        tracing::debug!(
            target: "vector",
            "Trained {} IVF lists over {} vectors",
            centroids.len(),
            vectors.len()
        );

        let mut index = Self {
            rows: VectorRows::new(dimension),
            lists: vec![Vec::new(); centroids.len()],
            centroids,
            assignments: Vec::new(),
            probes: params.probes.max(1),
        };
        index.reserve(vectors.len());
        index.add(vectors);
        index
    }

    pub(crate) fn from_blob(decoded: DecodedBlob, probes: usize) -> Self {
        let mut lists = vec![Vec::new(); decoded.nlist];
        let assignments: Vec<ClusterId> = decoded
            .assignments
            .iter()
            .map(|&list| ClusterId::new(list))
            .collect();
        for (id, cluster) in assignments.iter().enumerate() {
            lists[cluster.index()].push(VectorId::new(id as u32));
        }
        Self {
            rows: VectorRows::from_values(decoded.dimension, decoded.vectors),
            centroids: VectorRows::from_values(decoded.dimension, decoded.centroids),
            assignments,
            lists,
            probes: probes.max(1),
        }
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    pub fn cluster_of(&self, id: VectorId) -> Option<ClusterId> {
        self.assignments.get(id.index()).copied()
    }

    /// Lists to scan for `query`, nearest centroid first.
    fn probe_order(&self, query: &[f32]) -> Vec<ClusterId> {
        let mut order: Vec<(usize, f32)> = (0..self.centroids.len())
            .map(|c| (c, dot(query, self.centroids.row(c))))
            .collect();
        order.sort_by(|(a_id, a), (b_id, b)| b.total_cmp(a).then_with(|| a_id.cmp(b_id)));
        order
            .into_iter()
            .take(self.probes)
            .map(|(c, _)| ClusterId::new(c as u32))
            .collect()
    }
}

impl AnnIndex for IvfFlatIndex {
    fn variant(&self) -> IndexVariant {
        IndexVariant::IvfFlat
    }

    fn dimension(&self) -> VectorDimension {
        self.rows.dimension()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn reserve(&mut self, additional: usize) {
        self.rows.reserve(additional);
        self.assignments.reserve(additional);
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Vec<VectorId> {
        let mut ids = Vec::with_capacity(vectors.len());
        for vector in vectors {
            let cluster = nearest_centroid(&self.centroids, vector);
            let id = self.rows.push(vector);
            self.assignments.push(cluster);
            self.lists[cluster.index()].push(id);
            ids.push(id);
        }
        ids
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(VectorId, Score)> {
        if k == 0 || self.rows.len() == 0 {
            return Vec::new();
        }
        let candidates = self
            .probe_order(query)
            .into_iter()
            .flat_map(|cluster| self.lists[cluster.index()].iter().copied())
            .map(|id| (id, dot(query, self.rows.row(id.index()))))
            .collect();
        rank(candidates, k)
    }

    fn encode(&self) -> Vec<u8> {
        let header = BlobHeader {
            variant: IndexVariant::IvfFlat,
            dimension: self.rows.dimension().get(),
            count: self.rows.len(),
            nlist: self.centroids.len(),
        };
        let assignments: Vec<u32> = self.assignments.iter().map(ClusterId::get).collect();
        blob::encode(
            &header,
            self.centroids.values(),
            &assignments,
            self.rows.values(),
        )
    }
}

/// One list whose centroid is the normalised mean (zero when empty).
fn single_centroid(dimension: VectorDimension, vectors: &[Vec<f32>]) -> VectorRows {
    let mut mean = vec![0.0f32; dimension.get()];
    for vector in vectors {
        for (m, v) in mean.iter_mut().zip(vector) {
            *m += v;
        }
    }
    super::types::normalize(&mut mean);
    let mut rows = VectorRows::new(dimension);
    rows.push(&mean);
    rows
}

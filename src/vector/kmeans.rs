//! Deterministic spherical k-means for IVF training.
//!
//! Seeds are evenly strided input vectors, so the same input always yields
//! the same centroids. Centroids are kept at unit length and compared by
//! dot product, matching how vectors are scored at query time.

use super::ann::VectorRows;
use super::types::{ClusterId, VectorDimension, dot, normalize};

const DEFAULT_MAX_ITERATIONS: usize = 25;

#[derive(Debug, Clone, Copy)]
pub(crate) struct KMeansParams {
    pub clusters: usize,
    pub max_iterations: usize,
}

impl KMeansParams {
    pub(crate) fn new(clusters: usize) -> Self {
        Self {
            clusters,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Centroid with the highest dot product; lowest index wins ties.
pub(crate) fn nearest_centroid(centroids: &VectorRows, vector: &[f32]) -> ClusterId {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for c in 0..centroids.len() {
        let score = dot(vector, centroids.row(c));
        if score.total_cmp(&best_score).is_gt() {
            best = c;
            best_score = score;
        }
    }
    ClusterId::new(best as u32)
}

/// Train `params.clusters` centroids over `vectors`.
///
/// The caller guarantees `1 <= clusters <= vectors.len()`.
pub(crate) fn train(
    dimension: VectorDimension,
    vectors: &[Vec<f32>],
    params: KMeansParams,
) -> VectorRows {
    let n = vectors.len();
    let k = params.clusters.clamp(1, n.max(1));
    let dim = dimension.get();

    let mut centroids = VectorRows::new(dimension);
    for c in 0..k {
        centroids.push(&vectors[c * n / k]);
    }

    let mut assignments: Vec<ClusterId> = vectors
        .iter()
        .map(|v| nearest_centroid(&centroids, v))
        .collect();

    for iteration in 0..params.max_iterations {
        let mut sums = vec![0.0f32; k * dim];
        let mut sizes = vec![0usize; k];
        for (vector, cluster) in vectors.iter().zip(&assignments) {
            let c = cluster.index();
            sizes[c] += 1;
            for (s, v) in sums[c * dim..(c + 1) * dim].iter_mut().zip(vector) {
                *s += v;
            }
        }

        let mut next = VectorRows::new(dimension);
        for c in 0..k {
            if sizes[c] == 0 {
                // empty cluster keeps its previous position
                next.push(centroids.row(c));
            } else {
                let mean = &mut sums[c * dim..(c + 1) * dim];
                normalize(mean);
                next.push(mean);
            }
        }
        centroids = next;

        let mut changed = 0usize;
        for (vector, cluster) in vectors.iter().zip(assignments.iter_mut()) {
            let nearest = nearest_centroid(&centroids, vector);
            if nearest != *cluster {
                *cluster = nearest;
                changed += 1;
            }
        }
        if changed == 0 {
            tracing::trace!(
                target: "vector",
                "k-means converged after {} iterations",
                iteration + 1
            );
            break;
        }
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_obvious_clusters() {
        let dimension = VectorDimension::new(2).unwrap();
        let mut vectors = Vec::new();
        for i in 0..10 {
            let mut a = vec![1.0, 0.01 * i as f32];
            let mut b = vec![0.01 * i as f32, 1.0];
            normalize(&mut a);
            normalize(&mut b);
            vectors.push(a);
            vectors.push(b);
        }

        let centroids = train(dimension, &vectors, KMeansParams::new(2));
        assert_eq!(centroids.len(), 2);

        let first = nearest_centroid(&centroids, &[1.0, 0.0]);
        let second = nearest_centroid(&centroids, &[0.0, 1.0]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_training_is_deterministic() {
        let dimension = VectorDimension::new(3).unwrap();
        let vectors: Vec<Vec<f32>> = (0..30)
            .map(|i| {
                let mut v = vec![(i % 3) as f32, ((i * 7) % 5) as f32, 1.0];
                normalize(&mut v);
                v
            })
            .collect();
        let a = train(dimension, &vectors, KMeansParams::new(4));
        let b = train(dimension, &vectors, KMeansParams::new(4));
        assert_eq!(a.values(), b.values());
    }

    #[test]
    fn test_nearest_centroid_prefers_lowest_index_on_tie() {
        let dimension = VectorDimension::new(2).unwrap();
        let mut centroids = VectorRows::new(dimension);
        centroids.push(&[1.0, 0.0]);
        centroids.push(&[1.0, 0.0]);
        assert_eq!(nearest_centroid(&centroids, &[1.0, 0.0]).get(), 0);
    }
}

//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use quarry::Fragment;
use quarry::semantic::{EmbeddingGenerator, EmbeddingResult};
use rand::prelude::*;

/// Deterministic bag-of-words embedder that counts its calls.
///
/// Texts sharing words get similar vectors, so ranking behaves roughly
/// like a real model without downloading one.
pub struct HashingGenerator {
    model: String,
    dimension: usize,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl HashingGenerator {
    pub fn new(model: &str, dimension: usize) -> Self {
        Self {
            model: model.to_string(),
            dimension,
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }

    /// Number of `embed_batch` calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts embedded over all calls.
    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        vector[0] = 0.1;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let slot = fnv1a(&word.to_lowercase()) as usize % self.dimension;
            vector[slot] += 1.0;
        }
        vector
    }
}

impl EmbeddingGenerator for HashingGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// `n` pseudo-random vectors in `[-1, 1)`, reproducible per `seed`.
pub fn random_vectors(n: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            (0..dimension)
                .map(|_| rng.random_range(-1.0f32..1.0))
                .collect()
        })
        .collect()
}

/// One distinct fragment per vector.
pub fn fragments(n: usize, offset: usize) -> Vec<Fragment> {
    (offset..offset + n)
        .map(|i| {
            Fragment::new(
                format!("src/file_{i}.py"),
                "FunctionDef",
                format!("func_{i}"),
                format!("def func_{i}():\n    return {i}"),
                1,
                2,
            )
        })
        .collect()
}

//! Type-safe wrappers for vector ids, cluster ids, scores and dimensions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{VectorStoreError, VectorStoreResult};

/// Position of an entry in a vector store.
///
/// Ids are dense and start at zero: entry `n` of the index and fragment `n`
/// of the metadata sequence are the same logical entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorId(u32);

impl VectorId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inverted-list number inside an IVF index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(u32);

impl ClusterId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Similarity in `[0, 1]`; 1.0 means identical direction.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Score(f32);

impl Score {
    /// Map a cosine similarity in `[-1, 1]` onto `[0, 1]`.
    pub fn from_cosine(cosine: f32) -> Self {
        if cosine.is_nan() {
            return Self(0.0);
        }
        Self(((cosine + 1.0) / 2.0).clamp(0.0, 1.0))
    }

    pub fn get(&self) -> f32 {
        self.0
    }
}

/// Dimensionality shared by every vector in one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    pub fn new(dimension: usize) -> VectorStoreResult<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::InvalidDimension { dimension });
        }
        Ok(Self(dimension))
    }

    pub fn get(&self) -> usize {
        self.0
    }

    pub fn validate_vector(&self, vector: &[f32]) -> VectorStoreResult<()> {
        if vector.len() != self.0 {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ANN backend identifier, recorded in both index artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexVariant {
    /// Exhaustive scan.
    Flat,
    /// Inverted lists over k-means centroids.
    #[default]
    IvfFlat,
}

impl IndexVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::IvfFlat => "ivf-flat",
        }
    }

    pub(crate) fn tag(&self) -> u32 {
        match self {
            Self::Flat => 0,
            Self::IvfFlat => 1,
        }
    }

    pub(crate) fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Flat),
            1 => Some(Self::IvfFlat),
            _ => None,
        }
    }
}

impl fmt::Display for IndexVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexVariant {
    type Err = VectorStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "ivf-flat" | "ivfflat" | "ivf" => Ok(Self::IvfFlat),
            other => Err(VectorStoreError::UnknownVariant(other.to_string())),
        }
    }
}

/// Scale `vector` to unit length in place. Zero vectors are left as is.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// Vector index module
// Nearest-neighbour backends behind the `VectorBackend` trait

pub mod flat;
pub mod lancedb;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use crate::Result;
use crate::config::{Config, RetrievalBackendKind};

pub use flat::FlatIndex;
pub use lancedb::LanceIndex;

/// Distance used consistently at build and query time.
///
/// `Euclidean` is squared L2, the value exact L2 indexes report. `Cosine` is
/// `1 - cos(a, b)`. Smaller is closer for both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Cosine,
}

impl DistanceMetric {
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
        }
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Euclidean => write!(f, "euclidean (squared L2)"),
            Self::Cosine => write!(f, "cosine"),
        }
    }
}

/// Vector plus the external id used for upserts
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
}

/// Raw index hit
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub id: String,
    pub distance: f32,
}

/// Order by increasing distance, lowest position first on ties
#[inline]
pub fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.position.cmp(&b.position))
}

#[async_trait]
pub trait VectorBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn metric(&self) -> DistanceMetric;

    /// Number of indexed vectors
    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents wholesale; positions follow `entries` order
    async fn build(&mut self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Up to `k` nearest neighbours ordered by `compare_neighbors`.
    /// Fails with `EmptyIndex` when nothing has been indexed.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Replace the vector stored under `entry.id`, or append it. Returns the position.
    async fn upsert(&mut self, entry: IndexEntry) -> Result<usize>;

    /// Release storage held by this backend
    async fn clear(&mut self) -> Result<()>;
}

/// Creates empty backends for new index snapshots
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// `generation` is unique per snapshot within a process
    async fn create(&self, generation: u64) -> Result<Box<dyn VectorBackend>>;
}

#[derive(Debug, Clone, Copy)]
pub struct FlatFactory {
    pub metric: DistanceMetric,
}

#[async_trait]
impl BackendFactory for FlatFactory {
    #[inline]
    async fn create(&self, _generation: u64) -> Result<Box<dyn VectorBackend>> {
        Ok(Box::new(FlatIndex::new(self.metric)))
    }
}

#[derive(Debug, Clone)]
pub struct LanceFactory {
    pub path: PathBuf,
    pub metric: DistanceMetric,
}

#[async_trait]
impl BackendFactory for LanceFactory {
    #[inline]
    async fn create(&self, generation: u64) -> Result<Box<dyn VectorBackend>> {
        let index = LanceIndex::open(&self.path, generation, self.metric).await?;
        Ok(Box::new(index))
    }
}

/// Factory selected by `[retrieval].backend`
#[inline]
pub fn factory_from_config(config: &Config) -> Box<dyn BackendFactory> {
    match config.retrieval.backend {
        RetrievalBackendKind::Flat => Box::new(FlatFactory {
            metric: config.retrieval.metric,
        }),
        RetrievalBackendKind::Lancedb => Box::new(LanceFactory {
            path: config.vector_database_path(),
            metric: config.retrieval.metric,
        }),
    }
}

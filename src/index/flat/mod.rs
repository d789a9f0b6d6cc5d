
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use super::{DistanceMetric, IndexEntry, Neighbor, VectorBackend, compare_neighbors};
use crate::embeddings::check_dimension;
use crate::{FaqError, Result};

/// Exact brute-force index held in memory; positions are insertion order
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    metric: DistanceMetric,
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl FlatIndex {
    #[inline]
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            ..Self::default()
        }
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Synchronous scan shared by the trait method and benchmarks
    #[inline]
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let Some(dimension) = self.dimension.filter(|_| !self.entries.is_empty()) else {
            return Err(FaqError::EmptyIndex);
        };
        check_dimension(vector, dimension)?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| Neighbor {
                position,
                id: entry.id.clone(),
                distance: self.metric.distance(vector, &entry.vector),
            })
            .collect();

        neighbors.sort_by(compare_neighbors);
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn expect_dimension(&mut self, vector: &[f32]) -> Result<()> {
        match self.dimension {
            Some(dimension) => check_dimension(vector, dimension),
            None => {
                self.dimension = Some(vector.len());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl VectorBackend for FlatIndex {
    #[inline]
    fn name(&self) -> &'static str {
        "flat"
    }

    #[inline]
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[inline]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    async fn build(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut rebuilt = Self::new(self.metric);
        for entry in entries {
            rebuilt.expect_dimension(&entry.vector)?;
            if rebuilt.positions.contains_key(&entry.id) {
                return Err(FaqError::MalformedSource(format!(
                    "duplicate index id '{}'",
                    entry.id
                )));
            }
            rebuilt
                .positions
                .insert(entry.id.clone(), rebuilt.entries.len());
            rebuilt.entries.push(entry);
        }

        debug!(
            "Built flat index with {} vectors ({:?} dimensions)",
            rebuilt.entries.len(),
            rebuilt.dimension
        );
        *self = rebuilt;
        Ok(())
    }

    #[inline]
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.search(vector, k)
    }

    #[inline]
    async fn upsert(&mut self, entry: IndexEntry) -> Result<usize> {
        self.expect_dimension(&entry.vector)?;

        if let Some(&position) = self.positions.get(&entry.id) {
            self.entries[position] = entry;
            Ok(position)
        } else {
            let position = self.entries.len();
            self.positions.insert(entry.id.clone(), position);
            self.entries.push(entry);
            Ok(position)
        }
    }

    #[inline]
    async fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.positions.clear();
        self.dimension = None;
        Ok(())
    }
}

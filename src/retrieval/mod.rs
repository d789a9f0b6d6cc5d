// Retrieval module
// Owns the embedder and the current index snapshot

#[cfg(test)]
mod tests;

use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embeddings::{Embedder, check_dimension};
use crate::index::{BackendFactory, IndexEntry, VectorBackend};
use crate::knowledge::QARecord;
use crate::{FaqError, Result};

/// Best-match record for a query, with the raw backend distance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub record_id: String,
    pub category: String,
    pub matched_question: String,
    pub matched_answer: String,
    pub distance: f32,
}

impl RetrievalResult {
    /// Caller-side "no match" policy; the retriever itself never filters
    #[inline]
    pub fn within(&self, max_distance: Option<f32>) -> bool {
        max_distance.is_none_or(|max| self.distance <= max)
    }

    fn from_record(record: &QARecord, distance: f32) -> Self {
        Self {
            record_id: record.id.clone(),
            category: record.category.clone(),
            matched_question: record.question.clone(),
            matched_answer: record.answer.clone(),
            distance,
        }
    }
}

struct IndexSnapshot {
    backend: Box<dyn VectorBackend>,
    records: Vec<QARecord>,
    model_id: String,
    dimension: usize,
    generation: u64,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    factory: Arc<dyn BackendFactory>,
    snapshot: RwLock<Option<IndexSnapshot>>,
    next_generation: AtomicU64,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            embedder,
            factory,
            snapshot: RwLock::new(None),
            next_generation: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Records in the current snapshot
    #[inline]
    pub async fn len(&self) -> usize {
        self.snapshot
            .read()
            .await
            .as_ref()
            .map_or(0, |snapshot| snapshot.records.len())
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Generation number of the snapshot currently served, if any
    #[inline]
    pub async fn generation(&self) -> Option<u64> {
        self.snapshot
            .read()
            .await
            .as_ref()
            .map(|snapshot| snapshot.generation)
    }

    #[inline]
    pub async fn rebuild(&self, records: Vec<QARecord>) -> Result<()> {
        self.rebuild_with_progress(records, &ProgressBar::hidden())
            .await
    }

    /// Embed every question and build a fresh snapshot, then swap it in.
    /// Queries keep reading the previous snapshot until the swap.
    #[inline]
    pub async fn rebuild_with_progress(
        &self,
        records: Vec<QARecord>,
        bar: &ProgressBar,
    ) -> Result<()> {
        let dimension = self.embedder.dimension();
        bar.set_length(records.len() as u64);
        bar.set_position(0);

        let mut entries = Vec::with_capacity(records.len());
        let batch_size = self.embedder.batch_size().max(1);
        for chunk in records.chunks(batch_size) {
            let questions: Vec<String> = chunk.iter().map(|r| r.question.clone()).collect();
            let vectors = embed_texts(Arc::clone(&self.embedder), questions).await?;
            if vectors.len() != chunk.len() {
                return Err(FaqError::EmbeddingUnavailable(format!(
                    "expected {} embeddings, received {}",
                    chunk.len(),
                    vectors.len()
                )));
            }

            for (record, vector) in chunk.iter().zip(vectors) {
                check_dimension(&vector, dimension)?;
                entries.push(IndexEntry {
                    id: record.id.clone(),
                    vector,
                });
            }
            bar.inc(chunk.len() as u64);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let mut backend = self.factory.create(generation).await?;
        backend.build(entries).await?;

        let fresh = IndexSnapshot {
            backend,
            records,
            model_id: self.embedder.model_id().to_string(),
            dimension,
            generation,
        };
        info!(
            "Built index generation {} with {} records using {} ({} backend)",
            generation,
            fresh.records.len(),
            fresh.model_id,
            fresh.backend.name()
        );

        let previous = {
            let mut guard = self.snapshot.write().await;
            guard.replace(fresh)
        };

        if let Some(mut previous) = previous {
            debug!("Releasing index generation {}", previous.generation);
            if let Err(e) = previous.backend.clear().await {
                warn!(
                    "Failed to release index generation {}: {}",
                    previous.generation, e
                );
            }
        }

        Ok(())
    }

    /// Single best match (k = 1)
    #[inline]
    pub async fn search(&self, query: &str) -> Result<RetrievalResult> {
        self.search_top_k(query, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(FaqError::EmptyIndex)
    }

    /// Up to `k` matches ordered by increasing distance
    #[inline]
    pub async fn search_top_k(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if self.is_empty().await {
            return Err(FaqError::EmptyIndex);
        }

        let vector = self.embed_query(query).await?;
        self.search_vector(&vector, k).await
    }

    /// Embed a query with the build-time embedder
    #[inline]
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = embed_texts(Arc::clone(&self.embedder), vec![query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| FaqError::EmbeddingUnavailable("empty embedding response".to_string()))
    }

    /// Look up an already-embedded query against the current snapshot
    #[inline]
    pub async fn search_vector(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let guard = self.snapshot.read().await;
        let Some(snapshot) = guard.as_ref().filter(|s| !s.records.is_empty()) else {
            return Err(FaqError::EmptyIndex);
        };
        check_dimension(vector, snapshot.dimension)?;

        let neighbors = snapshot.backend.query(vector, k).await?;
        debug!(
            "Query against generation {} ({}) returned {} neighbours",
            snapshot.generation,
            snapshot.model_id,
            neighbors.len()
        );

        neighbors
            .into_iter()
            .map(|neighbor| {
                let record = snapshot.records.get(neighbor.position).ok_or_else(|| {
                    FaqError::Database(format!(
                        "index position {} has no matching record",
                        neighbor.position
                    ))
                })?;
                Ok(RetrievalResult::from_record(record, neighbor.distance))
            })
            .collect()
    }

    /// Insert or replace one record by id under the exclusive lock
    #[inline]
    pub async fn upsert(&self, record: QARecord) -> Result<()> {
        let vector = self.embed_query(&record.question).await?;
        let dimension = self.embedder.dimension();
        check_dimension(&vector, dimension)?;

        let mut guard = self.snapshot.write().await;
        if guard.is_none() {
            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
            let backend = self.factory.create(generation).await?;
            *guard = Some(IndexSnapshot {
                backend,
                records: Vec::new(),
                model_id: self.embedder.model_id().to_string(),
                dimension,
                generation,
            });
        }

        let Some(snapshot) = guard.as_mut() else {
            return Err(FaqError::EmptyIndex);
        };
        let position = snapshot
            .backend
            .upsert(IndexEntry {
                id: record.id.clone(),
                vector,
            })
            .await?;

        if position < snapshot.records.len() {
            snapshot.records[position] = record;
        } else if position == snapshot.records.len() {
            snapshot.records.push(record);
        } else {
            return Err(FaqError::Database(format!(
                "backend returned position {} for an index of {} records",
                position,
                snapshot.records.len()
            )));
        }

        debug!(
            "Upserted record into generation {} ({} records)",
            snapshot.generation,
            snapshot.records.len()
        );
        Ok(())
    }
}

async fn embed_texts(embedder: Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| FaqError::EmbeddingUnavailable(format!("embedding task failed: {}", e)))?
}

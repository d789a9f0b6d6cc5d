// Embeddings module
// Text-to-vector conversion behind the `Embedder` trait

pub mod hashing;
pub mod ollama;


use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::{FaqError, Result};

pub use hashing::HashingEmbedder;
pub use ollama::OllamaClient;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must be deterministic for a fixed model: embedding the same
/// text through `embed` or `embed_batch` yields the same vector, and every
/// vector has exactly `dimension()` components.
pub trait Embedder: Send + Sync {
    /// Identifier recorded alongside every index built from this embedder
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Preferred number of texts per `embed_batch` call
    #[inline]
    fn batch_size(&self) -> usize {
        32
    }
}

/// Build the embedder selected by `[embedding].provider`
#[inline]
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Ollama => Ok(Box::new(
            OllamaClient::new(config).map_err(|e| FaqError::Config(format!("{:#}", e)))?,
        )),
        EmbeddingProvider::Hashing => Ok(Box::new(HashingEmbedder::new(
            config.dimension as usize,
        )?)),
    }
}

/// Reject a vector whose length differs from the declared dimension
#[inline]
pub fn check_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(FaqError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}

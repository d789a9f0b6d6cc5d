use thiserror::Error;

pub type Result<T> = std::result::Result<T, FaqError>;

#[derive(Error, Debug)]
pub enum FaqError {
    #[error("Malformed knowledge source: {0}")]
    MalformedSource(String),

    #[error("Embedding model unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("The knowledge base index is empty")]
    EmptyIndex,

    #[error("Generation backend error: {0}")]
    GenerationBackend(String),

    #[error("Web search failed: {0}")]
    WebSearch(String),

    #[error("Invalid generation parameters: {0}")]
    InvalidParameters(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod feedback;
pub mod generation;
pub mod index;
pub mod knowledge;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;
pub mod websearch;

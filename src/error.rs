//! Failure categories that cross module boundaries.
//!
//! Internals return `anyhow::Result`; the engine classifies a failure into
//! an [`EngineError`] at the point it knows which stage failed, and turns
//! that into the user-facing message returned by the public API.

use thiserror::Error;

/// Message returned when initialization finds nothing to index.
pub const NO_DATA_MESSAGE: &str =
    "No document chunks available. Please add PDF files to the data directory.";

#[derive(Debug, Error)]
pub enum EngineError {
    /// No chunks were produced and no prior index exists.
    #[error("{}", NO_DATA_MESSAGE)]
    NoData,

    #[error("ingestion failed: {0:#}")]
    Ingest(anyhow::Error),

    #[error("vector index error: {0:#}")]
    Index(anyhow::Error),

    #[error("embedding service error: {0:#}")]
    Embedding(anyhow::Error),

    #[error("generation service error: {0:#}")]
    Generation(anyhow::Error),

    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),
}

impl EngineError {
    /// Message reported by a failed `initialize`.
    pub fn init_message(&self) -> String {
        match self {
            EngineError::NoData => NO_DATA_MESSAGE.to_string(),
            other => format!("Error initializing system: {}", other),
        }
    }

    /// Message reported by a failed `analyze`.
    pub fn analyze_message(&self) -> String {
        format!("Error analyzing interactions: {}", self)
    }
}

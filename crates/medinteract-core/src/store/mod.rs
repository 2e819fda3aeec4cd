//! Vector index abstraction for MedInteract.
//!
//! The [`Store`] trait is the pluggable storage engine behind retrieval.
//! It persists (chunk, vector) pairs together with their provenance and
//! answers nearest-neighbour queries. Entries are never looked up
//! directly; the only read path is [`Store::similarity_search`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Passage};

/// A chunk paired with its embedding, ready to be inserted.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A stored entry returned from similarity search.
///
/// Carries the stored vector so callers can re-rank candidates (MMR)
/// without a second round-trip.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Cosine similarity to the query vector.
    pub score: f64,
}

impl ScoredEntry {
    pub fn to_passage(&self) -> Passage {
        Passage {
            source: self.chunk.source.clone(),
            page: self.chunk.page,
            text: self.chunk.text.clone(),
            score: self.score,
        }
    }
}

/// Abstract vector index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`count`](Store::count) | Number of persisted entries |
/// | [`embedding_model`](Store::embedding_model) | Model the index was built with |
/// | [`existing_hashes`](Store::existing_hashes) | Which chunk hashes are already indexed |
/// | [`insert`](Store::insert) | Add entries, skipping known hashes |
/// | [`flush`](Store::flush) | Make inserted entries durable |
/// | [`similarity_search`](Store::similarity_search) | Top-N by cosine similarity |
#[async_trait]
pub trait Store: Send + Sync {
    /// Number of entries in the index. `0` means "no index yet".
    async fn count(&self) -> Result<usize>;

    /// The embedding model recorded when the index was first populated.
    async fn embedding_model(&self) -> Result<Option<String>>;

    /// Return the subset of `hashes` that are already present.
    async fn existing_hashes(&self, hashes: &[String]) -> Result<HashSet<String>>;

    /// Insert entries embedded with `model`. Entries whose chunk hash is
    /// already present are ignored. Returns the number actually inserted.
    async fn insert(&self, entries: &[IndexEntry], model: &str) -> Result<usize>;

    /// Flush pending writes to durable storage. A no-op for stores that
    /// write through.
    async fn flush(&self) -> Result<()>;

    /// Return up to `limit` entries ordered by descending cosine
    /// similarity to `query_vec`.
    async fn similarity_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredEntry>>;
}

/// Sort entries by descending score, breaking ties by chunk id so the
/// order is deterministic.
pub fn sort_by_score(entries: &mut [ScoredEntry]) {
    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

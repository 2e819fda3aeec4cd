//! In-memory [`Store`] implementation for testing and ephemeral use.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Similarity search is
//! brute-force cosine similarity over all stored vectors. Nothing
//! survives the process.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{sort_by_score, IndexEntry, ScoredEntry, Store};

#[derive(Default)]
struct Inner {
    entries: Vec<IndexEntry>,
    hashes: HashSet<String>,
    model: Option<String>,
}

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.entries.len())
    }

    async fn embedding_model(&self) -> Result<Option<String>> {
        Ok(self.inner.read().map_err(poisoned)?.model.clone())
    }

    async fn existing_hashes(&self, hashes: &[String]) -> Result<HashSet<String>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(hashes
            .iter()
            .filter(|h| inner.hashes.contains(*h))
            .cloned()
            .collect())
    }

    async fn insert(&self, entries: &[IndexEntry], model: &str) -> Result<usize> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if inner.model.is_none() && !entries.is_empty() {
            inner.model = Some(model.to_string());
        }
        let mut inserted = 0;
        for entry in entries {
            if inner.hashes.insert(entry.chunk.hash.clone()) {
                inner.entries.push(entry.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn similarity_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredEntry>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut scored: Vec<ScoredEntry> = inner
            .entries
            .iter()
            .map(|e| ScoredEntry {
                chunk: e.chunk.clone(),
                vector: e.vector.clone(),
                score: cosine_similarity(query_vec, &e.vector) as f64,
            })
            .collect();
        sort_by_score(&mut scored);
        scored.truncate(limit);
        Ok(scored)
    }
}

//! Diversity-aware retrieval over a [`Store`].
//!
//! Retrieval runs in two stages:
//!
//! 1. Over-fetch `fetch_k` candidates by cosine similarity to the query.
//! 2. Select the final `k` with Maximal Marginal Relevance:
//!
//! ```text
//! mmr(c) = λ · sim(q, c) − (1 − λ) · max_{s ∈ selected} sim(c, s)
//! ```
//!
//! `λ = 1` is pure relevance ranking; `λ = 0` picks the most mutually
//! dissimilar candidates. Results are returned in selection order.

use anyhow::{bail, Result};
use tracing::debug;

use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::models::Passage;
use crate::store::{ScoredEntry, Store};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Number of passages returned.
    pub k: usize,
    /// Size of the candidate pool fetched before re-ranking.
    pub fetch_k: usize,
    /// Relevance/diversity mix in `[0, 1]`.
    pub lambda: f32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: 5,
            fetch_k: 15,
            lambda: 0.7,
        }
    }
}

impl RetrievalParams {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            bail!("retrieval.k must be >= 1");
        }
        if self.fetch_k < self.k {
            bail!("retrieval.fetch_k must be >= retrieval.k");
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            bail!("retrieval.lambda must be in [0.0, 1.0]");
        }
        Ok(())
    }
}

/// Retrieve up to `params.k` diverse, relevant passages for `query`.
///
/// An empty index or a blank query yields an empty result without calling
/// the embedding service. Embedding and store failures are returned as
/// errors.
pub async fn retrieve(
    store: &dyn Store,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    params: &RetrievalParams,
) -> Result<Vec<Passage>> {
    if query.trim().is_empty() || store.count().await? == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embed_query(embedder, query).await?;
    let candidates = store.similarity_search(&query_vec, params.fetch_k).await?;
    let picked = mmr_select(&query_vec, &candidates, params.k, params.lambda);

    debug!(
        candidates = candidates.len(),
        selected = picked.len(),
        "mmr retrieval"
    );

    Ok(picked.into_iter().map(|i| candidates[i].to_passage()).collect())
}

/// Select up to `k` candidate indices by Maximal Marginal Relevance.
///
/// Candidates are expected in descending-similarity order; ties in MMR
/// score go to the earlier candidate.
pub fn mmr_select(query_vec: &[f32], candidates: &[ScoredEntry], k: usize, lambda: f32) -> Vec<usize> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query_vec, &c.vector))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(&candidates[idx].vector, &candidates[s].vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let score = lambda * relevance[idx] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}

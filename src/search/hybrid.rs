//! Hybrid search: vector + lexical branches fused with Reciprocal Rank Fusion.
//!
//! Both branches rank the same filtered chunk set, so every lexical hit is
//! also a vector candidate. Fusion adds `1 / (k + rank)` per branch with
//! `k = 60` and 1-based ranks; chunks missing from a branch contribute
//! nothing for it. Ties break by lower vector rank, then lower lexical rank,
//! then `arxiv_id`. Scores are normalised into `[0, 1]` by dividing by the
//! top fused score — a presentational choice that never reorders results.

use std::collections::HashMap;

use tracing::debug;

use crate::error::AppError;

use super::embeddings::EmbeddingsClient;
use super::store::{PaperFilters, PaperStore, PaperSummary, SearchHit};

/// RRF constant. 60 is the common default from the literature.
const RRF_K: f64 = 60.0;

/// Upper bound accepted for `top_k`.
const MAX_TOP_K: usize = 50;

#[derive(Debug, Clone)]
pub struct HybridSearch {
    store: PaperStore,
    embeddings: EmbeddingsClient,
}

impl HybridSearch {
    pub fn new(store: PaperStore, embeddings: EmbeddingsClient) -> Self {
        Self { store, embeddings }
    }

    pub fn store(&self) -> &PaperStore {
        &self.store
    }

    /// Run hybrid retrieval and return up to `top_k` fused hits.
    ///
    /// Deterministic for identical index state; adding `top_k` capacity never
    /// removes higher-ranked results.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &PaperFilters,
    ) -> Result<Vec<SearchHit>, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::Search("query must not be empty".into()));
        }
        if top_k == 0 || top_k > MAX_TOP_K {
            return Err(AppError::Search(format!(
                "top_k must be in 1..={MAX_TOP_K}, got {top_k}"
            )));
        }

        // One embedding call per search.
        let query_embedding = self
            .embeddings
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Search("embedding service returned no vector".into()))?;

        let fetch_n = usize::max(50, top_k * 10);

        // ── Vector branch ─────────────────────────────────────────────────
        let candidates = self.store.chunk_candidates(filters)?;
        let arxiv_by_chunk: HashMap<i64, String> = candidates
            .iter()
            .map(|c| (c.chunk_id, c.arxiv_id.clone()))
            .collect();

        let mut vector_scored: Vec<(i64, f64)> = candidates
            .iter()
            .map(|c| (c.chunk_id, cosine(&query_embedding, &c.embedding)))
            .collect();
        // Secondary key keeps equal-similarity order stable across runs.
        vector_scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        vector_scored.truncate(fetch_n);

        let vector_rank: HashMap<i64, usize> = vector_scored
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (*id, i + 1))
            .collect();

        // ── Lexical branch ────────────────────────────────────────────────
        let lexical = self.store.lexical_search(query, filters, fetch_n)?;
        let lexical_rank: HashMap<i64, usize> = lexical
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (*id, i + 1))
            .collect();

        debug!(
            vector = vector_rank.len(),
            lexical = lexical_rank.len(),
            "hybrid branches ranked"
        );

        // ── Fusion ────────────────────────────────────────────────────────
        let mut fused: Vec<(i64, f64)> = vector_rank
            .keys()
            .chain(lexical_rank.keys())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .map(|id| {
                let mut score = 0.0;
                if let Some(r) = vector_rank.get(id) {
                    score += 1.0 / (RRF_K + *r as f64);
                }
                if let Some(r) = lexical_rank.get(id) {
                    score += 1.0 / (RRF_K + *r as f64);
                }
                (*id, score)
            })
            .collect();

        fused.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ra = vector_rank.get(&a.0).copied().unwrap_or(usize::MAX);
                    let rb = vector_rank.get(&b.0).copied().unwrap_or(usize::MAX);
                    ra.cmp(&rb)
                })
                .then_with(|| {
                    let ra = lexical_rank.get(&a.0).copied().unwrap_or(usize::MAX);
                    let rb = lexical_rank.get(&b.0).copied().unwrap_or(usize::MAX);
                    ra.cmp(&rb)
                })
                .then_with(|| {
                    let ea = arxiv_by_chunk.get(&a.0).map(String::as_str).unwrap_or("");
                    let eb = arxiv_by_chunk.get(&b.0).map(String::as_str).unwrap_or("");
                    ea.cmp(eb)
                })
        });
        fused.truncate(top_k);

        let top_score = fused.first().map(|(_, s)| *s).unwrap_or(0.0);
        if top_score <= 0.0 {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = fused.iter().map(|(id, _)| *id).collect();
        let mut hits = self.store.fetch_hits(&ids)?;
        for (hit, (_, score)) in hits.iter_mut().zip(fused.iter()) {
            hit.score = score / top_score;
        }
        Ok(hits)
    }

    /// Paper listing for the introspection tool and API.
    pub fn list_papers(
        &self,
        filters: &PaperFilters,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<PaperSummary>, usize), AppError> {
        self.store.list_papers(filters, limit, offset)
    }
}

/// Cosine similarity; zero when either vector has zero norm.
fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

//! Vector similarity and hybrid search utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Reciprocal Rank Fusion (RRF) for merging ranked result lists

use crm_core::memory::MemoryEntry;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank entries by cosine similarity to a query embedding.
///
/// Returns entries sorted by descending similarity, with `score` set to the
/// cosine similarity value. Only entries that have embeddings and meet the
/// minimum score threshold are included.
pub fn vector_search(
    entries: &[MemoryEntry],
    query_embedding: &[f32],
    limit: usize,
    min_score: f32,
) -> Vec<MemoryEntry> {
    let mut scored: Vec<(f32, MemoryEntry)> = entries
        .iter()
        .filter_map(|entry| {
            let emb = entry.embedding.as_ref()?;
            let sim = cosine_similarity(emb, query_embedding);
            if sim >= min_score {
                let mut e = entry.clone();
                e.score = sim;
                Some((sim, e))
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored.into_iter().map(|(_, e)| e).collect()
}

/// Reciprocal Rank Fusion (RRF) — merge two ranked result lists.
///
/// Each entry's final score = sum of 1/(k + rank) across both lists.
/// The constant k controls how much weight is given to lower-ranked items.
/// Standard value is k=60.
///
/// Returns merged results sorted by RRF score, deduplicated by entry ID.
pub fn reciprocal_rank_fusion(
    keyword_results: &[MemoryEntry],
    vector_results: &[MemoryEntry],
    k: u32,
    limit: usize,
) -> Vec<MemoryEntry> {
    use std::collections::HashMap;

    let k = k as f32;

    // Map: id → (rrf_score, best_entry)
    let mut scores: HashMap<String, (f32, MemoryEntry)> = HashMap::new();

    // Score keyword results
    for (rank, entry) in keyword_results.iter().enumerate() {
        let rrf_score = 1.0 / (k + rank as f32 + 1.0);
        scores
            .entry(entry.id.clone())
            .and_modify(|(score, _)| *score += rrf_score)
            .or_insert_with(|| (rrf_score, entry.clone()));
    }

    // Score vector results
    for (rank, entry) in vector_results.iter().enumerate() {
        let rrf_score = 1.0 / (k + rank as f32 + 1.0);
        scores
            .entry(entry.id.clone())
            .and_modify(|(score, _)| *score += rrf_score)
            .or_insert_with(|| (rrf_score, entry.clone()));
    }

    // Collect, sort by RRF score descending
    let mut results: Vec<MemoryEntry> = scores
        .into_values()
        .map(|(score, mut entry)| {
            entry.score = score;
            entry
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

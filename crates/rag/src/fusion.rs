//! Result fusion (C5) — merges ranked lists from multiple retrievers into
//! one de-duplicated, ordered list (§4.3).

use crm_core::rag::{FusionMethod, ScoredChunk};
use std::collections::HashMap;

/// RRF's rank-damping constant (§4.3, §8 scenario 1): `1 / (k + rank + 1)`.
const RRF_K: f64 = 60.0;

/// Per-list weights for `FusionMethod::Weighted`, indexed by list position.
/// Lists beyond this slice reuse the last weight (§4.3).
const WEIGHTED_WEIGHTS: &[f64] = &[1.0, 0.8, 0.6, 0.4, 0.4];

fn weight_for_list(list_index: usize) -> f64 {
    WEIGHTED_WEIGHTS
        .get(list_index)
        .copied()
        .unwrap_or(*WEIGHTED_WEIGHTS.last().unwrap())
}

/// Merge `lists` via `method`, de-duplicating by chunk id (§4.3, §8
/// invariant 3). Empty input produces empty output; a single list is
/// returned de-duplicated, first occurrence kept (§8 boundary behavior).
pub fn fuse(lists: &[Vec<ScoredChunk>], method: FusionMethod) -> Vec<ScoredChunk> {
    if lists.is_empty() {
        return Vec::new();
    }
    match method {
        FusionMethod::Rrf => fuse_rrf(lists),
        FusionMethod::Weighted => fuse_weighted(lists),
        FusionMethod::Max => fuse_max(lists),
    }
}

fn fuse_rrf(lists: &[Vec<ScoredChunk>]) -> Vec<ScoredChunk> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut first_seen: HashMap<String, ScoredChunk> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for list in lists {
        for (rank, scored) in list.iter().enumerate() {
            let id = scored.chunk.id.clone();
            let contribution = 1.0 / (RRF_K + rank as f64 + 1.0);
            *scores.entry(id.clone()).or_insert(0.0) += contribution;
            first_seen.entry(id.clone()).or_insert_with(|| scored.clone());
            if !order.contains(&id) {
                order.push(id);
            }
        }
    }

    let mut fused: Vec<ScoredChunk> = order
        .into_iter()
        .map(|id| {
            let mut sc = first_seen.remove(&id).unwrap();
            sc.score = scores[&id];
            sc
        })
        .collect();
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

fn fuse_weighted(lists: &[Vec<ScoredChunk>]) -> Vec<ScoredChunk> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut first_seen: HashMap<String, ScoredChunk> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for (list_index, list) in lists.iter().enumerate() {
        let weight = weight_for_list(list_index);
        for scored in list {
            let id = scored.chunk.id.clone();
            *scores.entry(id.clone()).or_insert(0.0) += weight * scored.score;
            first_seen.entry(id.clone()).or_insert_with(|| scored.clone());
            if !order.contains(&id) {
                order.push(id);
            }
        }
    }

    let mut fused: Vec<ScoredChunk> = order
        .into_iter()
        .map(|id| {
            let mut sc = first_seen.remove(&id).unwrap();
            sc.score = scores[&id];
            sc
        })
        .collect();
    // Ties broken by first-seen order (stable sort preserves insertion order
    // for equal keys, §4.3).
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

fn fuse_max(lists: &[Vec<ScoredChunk>]) -> Vec<ScoredChunk> {
    let mut best: HashMap<String, ScoredChunk> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for list in lists {
        for scored in list {
            let id = scored.chunk.id.clone();
            if !order.contains(&id) {
                order.push(id.clone());
            }
            match best.get(&id) {
                Some(existing) if existing.score >= scored.score => {}
                _ => {
                    best.insert(id, scored.clone());
                }
            }
        }
    }

    let mut fused: Vec<ScoredChunk> = order.into_iter().map(|id| best.remove(&id).unwrap()).collect();
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::rag::Chunk;

    fn chunk(id: &str) -> Chunk {
        Chunk::new(id, 0, 1, format!("content for {id}"))
    }

    fn scored(id: &str, score: f64) -> ScoredChunk {
        let mut c = chunk(id);
        c.id = id.to_string();
        ScoredChunk::new(c, score)
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(fuse(&[], FusionMethod::Rrf).is_empty());
    }

    #[test]
    fn single_list_is_deduplicated_passthrough() {
        let list = vec![scored("d1", 0.9), scored("d1", 0.5), scored("d2", 0.8)];
        let fused = fuse(&[list], FusionMethod::Rrf);
        let ids: Vec<&str> = fused.iter().map(|c| c.chunk.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"d1"));
        assert!(ids.contains(&"d2"));
    }

    /// §8 end-to-end scenario 1: RRF fusion determinism, inputs as given
    /// there (list A = `[(d1,.9),(d2,.8),(d3,.7)]`, list B =
    /// `[(d2,.85),(d1,.75),(d4,.6)]`, k=60). Because d1/d2 occupy symmetric
    /// ranks across the two lists (rank0+rank1 in both directions) and
    /// d3/d4 each appear solo at rank2 in their own list, the exact RRF
    /// formula (`1/(k+rank+1)`, matched verbatim against the original
    /// service's `_reciprocal_rank_fusion`) yields `d1 == d2 ≈ 0.03252` and
    /// `d3 == d4 ≈ 0.01587` — both pairs tied, broken by first-seen order.
    #[test]
    fn rrf_scenario_from_spec() {
        let list_a = vec![scored("d1", 0.9), scored("d2", 0.8), scored("d3", 0.7)];
        let list_b = vec![scored("d2", 0.85), scored("d1", 0.75), scored("d4", 0.6)];

        let fused = fuse(&[list_a, list_b], FusionMethod::Rrf);
        let ids: Vec<&str> = fused.iter().map(|c| c.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3", "d4"]);

        let d1_d2_score = 1.0 / 61.0 + 1.0 / 62.0;
        let d3_d4_score = 1.0 / 63.0;
        let expected = [d1_d2_score, d1_d2_score, d3_d4_score, d3_d4_score];
        for (scored, exp) in fused.iter().zip(expected.iter()) {
            assert!(
                (scored.score - exp).abs() < 1e-9,
                "got {} expected {exp}",
                scored.score
            );
        }
        assert!((d1_d2_score - 0.03252).abs() < 0.0001);
        assert!((d3_d4_score - 0.01587).abs() < 0.0001);
    }

    #[test]
    fn fusion_has_no_duplicate_ids() {
        let list_a = vec![scored("d1", 0.9), scored("d2", 0.8)];
        let list_b = vec![scored("d1", 0.5), scored("d3", 0.4)];
        for method in [FusionMethod::Rrf, FusionMethod::Weighted, FusionMethod::Max] {
            let fused = fuse(&[list_a.clone(), list_b.clone()], method);
            let mut ids: Vec<&str> = fused.iter().map(|c| c.chunk.id.as_str()).collect();
            let len_before = ids.len();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), len_before, "duplicate id under {method:?}");
        }
    }

    #[test]
    fn fusion_length_never_exceeds_union_of_ids() {
        let list_a = vec![scored("d1", 0.9), scored("d2", 0.8)];
        let list_b = vec![scored("d2", 0.5), scored("d3", 0.4)];
        for method in [FusionMethod::Rrf, FusionMethod::Weighted, FusionMethod::Max] {
            let fused = fuse(&[list_a.clone(), list_b.clone()], method);
            assert!(fused.len() <= 3);
        }
    }

    #[test]
    fn max_keeps_winning_occurrence() {
        let mut hi = chunk("d1");
        hi.content = "from list b, higher score".into();
        let list_a = vec![scored("d1", 0.3)];
        let list_b = vec![ScoredChunk::new(hi, 0.9)];
        let fused = fuse(&[list_a, list_b], FusionMethod::Max);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].score, 0.9);
        assert!(fused[0].chunk.content.contains("higher score"));
    }

    #[test]
    fn weighted_applies_declining_weights_per_list() {
        let list_a = vec![scored("d1", 1.0)];
        let list_b = vec![scored("d2", 1.0)];
        let fused = fuse(&[list_a, list_b], FusionMethod::Weighted);
        let d1 = fused.iter().find(|c| c.chunk.id == "d1").unwrap();
        let d2 = fused.iter().find(|c| c.chunk.id == "d2").unwrap();
        assert!(d1.score > d2.score);
    }
}

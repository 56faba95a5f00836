//! External retrieval collaborators (§4.5, §4.6): the vector store gateway
//! (C3) and the embedding/rerank gateway (C2). Both are in-process
//! interfaces — a conforming implementation may wrap any nearest-neighbor
//! engine or embedding/rerank model. This module defines the traits plus
//! one reference implementation of each so the RAG engine (C9) is testable
//! without a live backend (SPEC_FULL §3 test tooling).

use async_trait::async_trait;
use crm_core::error::GatewayError;
use crm_core::rag::{Chunk, ScoredChunk};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The vector store collaborator (§4.5). Collections are namespaced by a
/// plain string; upsert is idempotent by chunk id.
#[async_trait]
pub trait VectorStoreGateway: Send + Sync {
    async fn upsert(&self, collection: &str, chunks: Vec<Chunk>) -> Result<(), GatewayError>;

    /// Search `collection` for chunks relevant to `query_text`, returning up
    /// to `limit` results with similarity >= `score_threshold` (when set),
    /// sorted descending by similarity.
    async fn search(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        score_threshold: Option<f64>,
    ) -> Result<Vec<ScoredChunk>, GatewayError>;
}

/// The embedding/rerank collaborator (§4.6). Embedding dimensionality is
/// fixed for the lifetime of a process.
#[async_trait]
pub trait EmbedRerankGateway: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError>;

    /// Score `(query, doc)` pairs, returning at most `top_k` entries sorted
    /// descending by score. `index` refers into `docs`. Total: every index
    /// not returned is considered unranked by the caller (§4.6).
    async fn rerank(&self, query: &str, docs: &[String], top_k: usize) -> Result<Vec<(usize, f64)>, GatewayError>;
}

/// An in-memory vector store that conforms to `VectorStoreGateway` using
/// simple lexical token-overlap similarity (Jaccard over whitespace tokens)
/// as a stand-in for a real embedding-backed k-NN index. Deterministic and
/// dependency-free, suitable for tests and as the default when no external
/// vector database is configured.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tokenize(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[async_trait]
impl VectorStoreGateway for InMemoryVectorStore {
    async fn upsert(&self, collection: &str, chunks: Vec<Chunk>) -> Result<(), GatewayError> {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        for chunk in chunks {
            if let Some(existing) = entry.iter_mut().find(|c| c.id == chunk.id) {
                *existing = chunk;
            } else {
                entry.push(chunk);
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        score_threshold: Option<f64>,
    ) -> Result<Vec<ScoredChunk>, GatewayError> {
        let collections = self.collections.read().await;
        let Some(chunks) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let threshold = score_threshold.unwrap_or(0.0);
        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .map(|c| ScoredChunk::new(c.clone(), jaccard_similarity(query_text, &c.content)))
            .filter(|sc| sc.score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// A deterministic embed/rerank gateway: `embed` hashes text into a fixed-
/// dimension vector (stable across calls within a process, per §4.6), and
/// `rerank` scores by the same lexical overlap the in-memory vector store
/// uses, so tests can exercise rerank-mode retrieval without a live model.
pub struct DeterministicEmbedRerank {
    dimensions: usize,
}

impl DeterministicEmbedRerank {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for DeterministicEmbedRerank {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbedRerankGateway for DeterministicEmbedRerank {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let mut vector = vec![0.0f32; self.dimensions];
        for (i, token) in tokenize(text).into_iter().enumerate() {
            let bucket = (token_hash(&token) as usize) % self.dimensions;
            vector[bucket] += 1.0;
            let _ = i;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    async fn rerank(&self, query: &str, docs: &[String], top_k: usize) -> Result<Vec<(usize, f64)>, GatewayError> {
        let mut scored: Vec<(usize, f64)> = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| (i, jaccard_similarity(query, doc)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn token_hash(token: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let store = InMemoryVectorStore::new();
        let chunk = Chunk::new("doc1", 0, 1, "hello world");
        store.upsert("col", vec![chunk.clone()]).await.unwrap();
        store.upsert("col", vec![chunk]).await.unwrap();

        let results = store.search("col", "hello", 10, None).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn search_respects_threshold_and_limit() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(
                "col",
                vec![
                    Chunk::new("doc1", 0, 1, "rust programming language"),
                    Chunk::new("doc2", 0, 1, "completely unrelated topic"),
                ],
            )
            .await
            .unwrap();

        let results = store.search("col", "rust programming", 10, Some(0.2)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.original_doc_id, "doc1");
    }

    #[tokio::test]
    async fn empty_store_returns_empty_results() {
        let store = InMemoryVectorStore::new();
        let results = store.search("nonexistent", "anything", 10, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn embed_is_deterministic_and_fixed_dimension() {
        let gateway = DeterministicEmbedRerank::new(16);
        let v1 = gateway.embed("some text").await.unwrap();
        let v2 = gateway.embed("some text").await.unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.len(), 16);
    }

    #[tokio::test]
    async fn rerank_returns_at_most_top_k_sorted_descending() {
        let gateway = DeterministicEmbedRerank::default();
        let docs = vec![
            "rust programming".to_string(),
            "completely unrelated".to_string(),
            "rust programming language guide".to_string(),
        ];
        let ranked = gateway.rerank("rust programming", &docs, 2).await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].1 >= ranked[1].1);
    }
}

//! Shared data model for the retrieval-augmented generation pipeline
//! (chunking, retrieval, fusion, packing, generation). The operations that
//! produce and consume these types live in `crm-rag`; this crate only
//! defines the shapes so that `crm-providers` and `crm-rag` can agree on
//! them without a circular dependency.

use serde::{Deserialize, Serialize};

/// A contiguous, bounded slice of a source document — the atomic retrieval
/// unit. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub original_doc_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(
        original_doc_id: impl Into<String>,
        chunk_index: usize,
        total_chunks: usize,
        content: impl Into<String>,
    ) -> Self {
        let original_doc_id = original_doc_id.into();
        Self {
            id: format!("{original_doc_id}_{chunk_index}"),
            original_doc_id,
            chunk_index,
            total_chunks,
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// A chunk annotated with a retrieval score. Produced by the vector store
/// gateway or by result fusion; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl ScoredChunk {
    pub fn new(chunk: Chunk, score: f64) -> Self {
        Self {
            chunk,
            score,
            distance: None,
        }
    }
}

/// Which retrieval procedure the RAG engine used (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Simple,
    Fusion,
    Rerank,
    Hybrid,
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RetrievalMode::Simple => "simple",
            RetrievalMode::Fusion => "fusion",
            RetrievalMode::Rerank => "rerank",
            RetrievalMode::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

/// The strategy used to merge multiple ranked result lists (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    Rrf,
    Weighted,
    Max,
}

/// The result of one retrieval call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub documents: Vec<ScoredChunk>,
    pub mode: RetrievalMode,
    pub retrieval_time_ms: u64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A single cited source in a `RAGAnswer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSource {
    pub index: usize,
    pub content_preview: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub score: f64,
}

/// The full output of a RAG query (§3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<RagSource>,
    pub confidence: f64,
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
    pub mode: RetrievalMode,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Mutable RAG configuration. Updates atomically replace the in-memory
/// value and trigger a rebuild of dependent components (chunker, packer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub rerank_top_k: usize,
    pub context_window_tokens: usize,
    pub enable_rerank: bool,
    pub enable_fusion: bool,
    pub temperature: f32,
    pub max_gen_tokens: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            top_k: 10,
            similarity_threshold: 0.7,
            rerank_top_k: 5,
            context_window_tokens: 4000,
            enable_rerank: true,
            enable_fusion: true,
            temperature: 0.1,
            max_gen_tokens: 1000,
        }
    }
}

//! The RAG Engine (C9) — ties the chunker (C1), fusion (C5), packer (C6),
//! vector-store and embed/rerank gateways (C3, C2), and the Model Router
//! (C7) into the single `addDocuments` / `retrieve` / `generate` / `query`
//! contract (§4.9).

use crate::chunker::Chunker;
use crate::fusion::fuse;
use crate::gateway::{EmbedRerankGateway, VectorStoreGateway};
use crate::packer::ContextPacker;
use crm_core::rag::{
    Chunk, FusionMethod, RagAnswer, RagConfig, RagSource, RetrievalMode, RetrievalResult,
    ScoredChunk,
};
use crm_providers::{ChatCompletionRequest, ModelRouter};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// An input document to `RagEngine::add_documents` (§4.9).
#[derive(Debug, Clone)]
pub struct InputDocument {
    pub id: String,
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The prompt text returned verbatim when packing yields no chunks — asked
/// for but answerable from nothing (§4.9 "no relevant context").
const NO_CONTEXT_RESPONSE: &str =
    "I don't have enough relevant information in the knowledge base to answer that question.";

pub struct RagEngine {
    vector_store: Arc<dyn VectorStoreGateway>,
    embed_rerank: Arc<dyn EmbedRerankGateway>,
    router: Arc<ModelRouter>,
    config: RwLock<RagConfig>,
    chunker: RwLock<Chunker>,
    packer: RwLock<ContextPacker>,
}

impl RagEngine {
    pub fn new(
        vector_store: Arc<dyn VectorStoreGateway>,
        embed_rerank: Arc<dyn EmbedRerankGateway>,
        router: Arc<ModelRouter>,
        config: RagConfig,
    ) -> Self {
        let chunker = Chunker::from_config(&config);
        let packer = ContextPacker::new(config.context_window_tokens);
        Self {
            vector_store,
            embed_rerank,
            router,
            config: RwLock::new(config),
            chunker: RwLock::new(chunker),
            packer: RwLock::new(packer),
        }
    }

    /// Replace the engine's configuration atomically, rebuilding the chunker
    /// and packer against the new values (§4.9 `updateConfig`).
    pub async fn update_config(&self, new_config: RagConfig) {
        let chunker = Chunker::from_config(&new_config);
        let packer = ContextPacker::new(new_config.context_window_tokens);
        *self.chunker.write().await = chunker;
        *self.packer.write().await = packer;
        *self.config.write().await = new_config;
    }

    pub async fn config(&self) -> RagConfig {
        self.config.read().await.clone()
    }

    /// Split, tag, and upsert each document's chunks into `collection`
    /// (§4.9 "Ingest").
    pub async fn add_documents(&self, collection: &str, documents: Vec<InputDocument>) -> Result<(), crm_core::error::Error> {
        let chunker = self.chunker.read().await;
        for doc in documents {
            let pieces = chunker.split(&doc.content);
            let total = pieces.len();
            let chunks: Vec<Chunk> = pieces
                .into_iter()
                .enumerate()
                .map(|(i, content)| {
                    let mut chunk = Chunk::new(&doc.id, i, total, content);
                    chunk.metadata = doc.metadata.clone();
                    chunk.metadata.insert("chunkIndex".into(), serde_json::json!(i));
                    chunk.metadata.insert("totalChunks".into(), serde_json::json!(total));
                    chunk.metadata.insert("originalDocId".into(), serde_json::json!(doc.id));
                    chunk
                })
                .collect();
            if let Err(err) = self.vector_store.upsert(collection, chunks).await {
                warn!(%collection, error = %err, "vector store upsert failed during ingest");
                return Err(crm_core::error::Error::Gateway(err));
            }
        }
        Ok(())
    }

    /// Retrieve chunks relevant to `query` from `collection`, using `mode`'s
    /// procedure (§4.9 table). Gateway failures degrade to an empty result
    /// rather than propagating (§4.9 "Failure").
    pub async fn retrieve(&self, query: &str, mode: RetrievalMode, collection: &str) -> RetrievalResult {
        let started = std::time::Instant::now();
        let config = self.config.read().await.clone();

        let documents = match mode {
            RetrievalMode::Simple => self.retrieve_simple(query, collection, &config).await,
            RetrievalMode::Fusion => self.retrieve_fusion(query, collection, &config).await,
            RetrievalMode::Rerank => self.retrieve_rerank(query, collection, &config).await,
            RetrievalMode::Hybrid => self.retrieve_hybrid(query, collection, &config).await,
        };

        RetrievalResult {
            documents,
            mode,
            retrieval_time_ms: started.elapsed().as_millis() as u64,
            metadata: serde_json::Map::new(),
        }
    }

    async fn retrieve_simple(&self, query: &str, collection: &str, config: &RagConfig) -> Vec<ScoredChunk> {
        self.vector_store
            .search(collection, query, config.top_k, Some(config.similarity_threshold))
            .await
            .unwrap_or_else(|err| {
                warn!(%collection, error = %err, "vector search failed, degrading to empty retrieval");
                Vec::new()
            })
    }

    async fn retrieve_fusion(&self, query: &str, collection: &str, config: &RagConfig) -> Vec<ScoredChunk> {
        let threshold = Some(0.8 * config.similarity_threshold);
        let paraphrases = [
            query.to_string(),
            format!("information about {query}"),
            format!("{query}-related content"),
        ];

        let mut lists = Vec::with_capacity(paraphrases.len());
        for p in &paraphrases {
            let results = self
                .vector_store
                .search(collection, p, config.top_k, threshold)
                .await
                .unwrap_or_else(|err| {
                    warn!(%collection, error = %err, "vector search failed during fusion, treating list as empty");
                    Vec::new()
                });
            lists.push(results);
        }

        fuse(&lists, FusionMethod::Rrf)
    }

    async fn retrieve_rerank(&self, query: &str, collection: &str, config: &RagConfig) -> Vec<ScoredChunk> {
        let threshold = Some(0.7 * config.similarity_threshold);
        let candidates = self
            .vector_store
            .search(collection, query, config.top_k * 2, threshold)
            .await
            .unwrap_or_else(|err| {
                warn!(%collection, error = %err, "vector search failed before rerank, degrading to empty retrieval");
                Vec::new()
            });
        self.apply_rerank(query, candidates, config.rerank_top_k).await
    }

    async fn retrieve_hybrid(&self, query: &str, collection: &str, config: &RagConfig) -> Vec<ScoredChunk> {
        let fused = self.retrieve_fusion(query, collection, config).await;
        if fused.len() > config.rerank_top_k && config.enable_rerank {
            self.apply_rerank(query, fused, config.rerank_top_k).await
        } else {
            let mut truncated = fused;
            truncated.truncate(config.rerank_top_k);
            truncated
        }
    }

    /// Rerank `candidates` against `query`, replacing their scores with the
    /// rerank gateway's scores (§4.9 "rerank" row).
    async fn apply_rerank(&self, query: &str, candidates: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
        if candidates.is_empty() {
            return candidates;
        }
        let docs: Vec<String> = candidates.iter().map(|c| c.chunk.content.clone()).collect();
        match self.embed_rerank.rerank(query, &docs, top_k).await {
            Ok(ranked) => ranked
                .into_iter()
                .filter_map(|(idx, score)| {
                    candidates.get(idx).map(|c| {
                        let mut reranked = c.clone();
                        reranked.score = score;
                        reranked
                    })
                })
                .collect(),
            Err(err) => {
                warn!(error = %err, "rerank gateway failed, keeping pre-rerank order");
                let mut fallback = candidates;
                fallback.truncate(top_k);
                fallback
            }
        }
    }

    /// Pack `chunks` and, unless packing kept nothing, ask the Model Router
    /// to answer `query` from them (§4.9 "Generation").
    pub async fn generate(&self, query: &str, chunks: &[ScoredChunk], _mode: RetrievalMode) -> String {
        let system_prompt = "You are a knowledgeable assistant. Answer the user's question using only the \
             numbered evidence provided below. Cite evidence by its number. If the evidence does not \
             contain the answer, say so plainly.";

        let packer = self.packer.read().await;
        let (_, kept) = packer.pack(query, chunks, system_prompt);
        if kept.is_empty() {
            return NO_CONTEXT_RESPONSE.to_string();
        }

        let evidence = kept
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c.chunk.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!("Evidence:\n{evidence}\n\nQuestion: {query}");
        let config = self.config.read().await.clone();

        let request = ChatCompletionRequest {
            messages: vec![
                crm_core::message::Message::system(system_prompt),
                crm_core::message::Message::user(prompt),
            ],
            temperature: config.temperature,
            max_tokens: Some(config.max_gen_tokens),
            ..Default::default()
        };

        match self.router.chat_completion(request).await {
            Ok(response) => response.content,
            Err(err) => format!("I encountered an error while generating a response: {err}"),
        }
    }

    /// Retrieve, pack, and generate an answer to `question` (§4.9 `query`).
    pub async fn query(&self, question: &str, mode: RetrievalMode, collection: &str) -> RagAnswer {
        let total_started = std::time::Instant::now();
        let retrieval = self.retrieve(question, mode, collection).await;

        let generation_started = std::time::Instant::now();
        let answer = self.generate(question, &retrieval.documents, mode).await;
        let generation_ms = generation_started.elapsed().as_millis() as u64;

        let confidence = if answer == NO_CONTEXT_RESPONSE || answer.starts_with("I encountered an error") {
            0.0
        } else {
            compute_confidence(&retrieval.documents)
        };

        let sources = retrieval
            .documents
            .iter()
            .enumerate()
            .map(|(i, c)| RagSource {
                index: i,
                content_preview: preview(&c.chunk.content),
                metadata: c.chunk.metadata.clone(),
                score: c.score,
            })
            .collect();

        RagAnswer {
            answer,
            sources,
            confidence,
            retrieval_ms: retrieval.retrieval_time_ms,
            generation_ms,
            total_ms: total_started.elapsed().as_millis() as u64,
            mode,
            metadata: serde_json::Map::new(),
        }
    }
}

const PREVIEW_CHARS: usize = 200;

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{truncated}...")
    }
}

/// `confidence = 0.7·avg(scores) + 0.2·(1 − variance(scores)) + 0.1·min(docCount/5, 1)`,
/// clamped to `[0,1]` (§4.9). Empty sources ⇒ `0`.
fn compute_confidence(documents: &[ScoredChunk]) -> f64 {
    if documents.is_empty() {
        return 0.0;
    }
    let scores: Vec<f64> = documents.iter().map(|c| c.score).collect();
    let n = scores.len() as f64;
    let avg = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / n;
    let doc_count_term = (documents.len() as f64 / 5.0).min(1.0);

    let confidence = 0.7 * avg + 0.2 * (1.0 - variance) + 0.1 * doc_count_term;
    confidence.clamp(0.0, 1.0)
}

//! Shared test fixtures for the specialized agents: a `RagEngine` backed by
//! in-memory gateways and a static provider, so each agent's tests can
//! exercise the real `analyze`/`execute`/`respond` lifecycle without a live
//! model or vector database.

#![cfg(test)]

use async_trait::async_trait;
use crm_core::error::ProviderError;
use crm_core::provider::{Endpoint, ModelDescriptor, Provider, ProviderRequest, ProviderResponse};
use crm_core::rag::RagConfig;
use crm_core::tool::ToolRegistry;
use crm_providers::ModelRouter;
use crm_rag::{DeterministicEmbedRerank, InMemoryVectorStore, RagEngine};
use std::collections::HashMap;
use std::sync::Arc;

struct StaticProvider;

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            message: crm_core::message::Message::assistant("Based on the available evidence [1], here is my answer."),
            usage: None,
            model: "static".into(),
            metadata: serde_json::Map::new(),
        })
    }
}

pub fn test_router() -> Arc<ModelRouter> {
    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    providers.insert("ep".into(), Arc::new(StaticProvider));
    let model = ModelDescriptor {
        name: "test-model".into(),
        max_gen_tokens: 500,
        context_window_tokens: 4000,
        supports_tools: false,
        supports_chinese: false,
        chinese_optimized: false,
        cost_per_1k_tokens: 0.0,
        priority: 1,
        endpoint_id: "ep".into(),
    };
    let endpoint = Endpoint {
        id: "ep".into(),
        base_url: "https://example.test".into(),
        api_key: "key".into(),
        model_prefix: None,
    };
    Arc::new(ModelRouter::new(vec![endpoint], providers, vec![model], "ep", Arc::new(ToolRegistry::new())))
}

pub fn in_memory_rag_engine() -> RagEngine {
    RagEngine::new(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(DeterministicEmbedRerank::default()),
        test_router(),
        RagConfig::default(),
    )
}

//! The Model Router (C7) — a fault-tolerant front-end to multiple
//! OpenAI-compatible endpoints: endpoint/model selection, conversation
//! (context) management, token-budget enforcement, tool/function
//! invocation, streaming, and the fallback cascade (§4.7).
//!
//! Built on top of the per-endpoint `Provider` implementations in this
//! crate (`AnthropicProvider`, `OpenAiCompatProvider`) — the router adds
//! the spec-shaped contract (model descriptors, conversation contexts,
//! fallback strategies) those providers don't know about on their own.

use async_trait::async_trait;
use crm_core::error::{Error, ProviderError};
use crm_core::message::{ConversationContext, ConversationId, Message};
use crm_core::provider::{
    Endpoint, FallbackInfo, FallbackStrategy, ModelDescriptor, Provider, ProviderRequest,
    ProviderResponse, StreamChunk, Usage,
};
use crm_core::tokens;
use crm_core::tool::{ToolCall as CoreToolCall, ToolRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// A cache of prior completions keyed by a content address — the optional
/// collaborator behind `FallbackStrategy::CachedResponse` (§4.7: "cache is
/// optional; absent ⇒ degrade to simple").
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: &str, value: String);
}

/// A trivial in-memory `ResponseCache`, keyed by a hash of the canonicalized
/// request. Suitable for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryResponseCache {
    entries: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl ResponseCache for InMemoryResponseCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: &str, value: String) {
        self.entries.write().await.insert(key.to_string(), value);
    }
}

/// A request into `ModelRouter::chat_completion` (§4.7).
#[derive(Debug, Clone)]
pub struct ChatCompletionRequest {
    pub messages: Vec<Message>,
    pub model_name: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub conversation_id: Option<String>,
    pub fallback_strategy: FallbackStrategy,
}

impl Default for ChatCompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            model_name: None,
            temperature: 0.7,
            max_tokens: None,
            conversation_id: None,
            fallback_strategy: FallbackStrategy::None,
        }
    }
}

/// The router's response, wrapping the underlying `ProviderResponse` with
/// fallback bookkeeping (§4.7).
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
    pub fallback: FallbackInfo,
}

/// A tool-call request/response pair (§4.7 `toolCall`).
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub id: String,
    pub name: String,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolCallResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallOutcome>,
}

/// Default per-call tool handler timeout (§4.8: "default 30 s").
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// The fixed apologetic payload `FallbackStrategy::SimpleResponse` returns
/// (§4.7).
const SIMPLE_FALLBACK_MESSAGE: &str =
    "I'm sorry, I'm unable to process your request right now. Please try again shortly.";

/// Fault-tolerant front-end to N OpenAI-compatible endpoints (§4.7).
pub struct ModelRouter {
    endpoints: HashMap<String, Endpoint>,
    providers: HashMap<String, Arc<dyn Provider>>,
    models: HashMap<String, ModelDescriptor>,
    default_endpoint_id: String,
    contexts: RwLock<HashMap<String, Arc<Mutex<ConversationContext>>>>,
    tool_registry: Arc<ToolRegistry>,
    tool_timeout: Duration,
    response_cache: Option<Arc<dyn ResponseCache>>,
}

impl ModelRouter {
    pub fn new(
        endpoints: Vec<Endpoint>,
        providers: HashMap<String, Arc<dyn Provider>>,
        models: Vec<ModelDescriptor>,
        default_endpoint_id: impl Into<String>,
        tool_registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            endpoints: endpoints.into_iter().map(|e| (e.id.clone(), e)).collect(),
            providers,
            models: models.into_iter().map(|m| (m.name.clone(), m)).collect(),
            default_endpoint_id: default_endpoint_id.into(),
            contexts: RwLock::new(HashMap::new()),
            tool_registry,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            response_cache: None,
        }
    }

    pub fn with_response_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.response_cache = Some(cache);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    // ---- Conversation context management (§4.7) ----

    pub async fn create_context(&self, id: ConversationId, user_id: Option<String>, max_context_tokens: usize) {
        let ctx = ConversationContext::new(id.clone(), user_id, max_context_tokens);
        self.contexts.write().await.insert(id.0.clone(), Arc::new(Mutex::new(ctx)));
    }

    pub async fn get_context(&self, id: &str) -> Option<ConversationContext> {
        let contexts = self.contexts.read().await;
        let handle = contexts.get(id)?;
        Some(handle.lock().await.clone())
    }

    /// Append a message to a conversation's stored context. Per-conversation
    /// appends serialize on that conversation's lock; the map-level read
    /// lock only guards lookup, so unrelated conversations never block each
    /// other (§5 shared resources).
    pub async fn append_context_message(&self, id: &str, message: Message) -> Result<(), Error> {
        let handle = {
            let contexts = self.contexts.read().await;
            contexts.get(id).cloned()
        };
        let handle = handle.ok_or_else(|| Error::NotFound(format!("conversation '{id}'")))?;
        let mut ctx = handle.lock().await;
        ctx.append(message);
        Ok(())
    }

    /// Persist this call's user-originated messages into `id`'s stored
    /// context, in order, before the assistant's reply is appended. Without
    /// this, only assistant replies would survive across calls and every
    /// multi-turn conversation would silently lose its user side (§4.7:
    /// context accumulates the full turn history for replay on the next
    /// call).
    async fn append_user_turn(&self, id: &str, request: &ChatCompletionRequest) {
        for msg in Self::canonicalize_messages(&request.messages) {
            let _ = self.append_context_message(id, msg).await;
        }
    }

    // ---- Model/endpoint resolution ----

    fn resolve_model(&self, model_name: Option<&str>) -> Option<ModelDescriptor> {
        match model_name {
            Some(name) => self.models.get(name).cloned(),
            None => self.models.values().min_by_key(|m| m.priority).cloned(),
        }
    }

    /// Endpoint bound to `model`, falling back to the configured default
    /// endpoint when the model has none configured (§4.7).
    fn endpoint_for(&self, model: &ModelDescriptor) -> Option<&Endpoint> {
        self.endpoints
            .get(&model.endpoint_id)
            .or_else(|| self.endpoints.get(&self.default_endpoint_id))
    }

    fn provider_for(&self, model: &ModelDescriptor) -> Option<Arc<dyn Provider>> {
        self.providers
            .get(&model.endpoint_id)
            .or_else(|| self.providers.get(&self.default_endpoint_id))
            .cloned()
    }

    /// Models ordered ascending by `priority`, excluding `exclude` (§4.7
    /// `nextModel`: "walk remaining models in ascending priority").
    fn fallback_order(&self, exclude: &str) -> Vec<ModelDescriptor> {
        let mut rest: Vec<ModelDescriptor> = self
            .models
            .values()
            .filter(|m| m.name != exclude)
            .cloned()
            .collect();
        rest.sort_by_key(|m| m.priority);
        rest
    }

    // ---- Pre-processing (§4.7) ----

    /// Collapse whitespace and map full-width Chinese punctuation to ASCII
    /// equivalents. Information-preserving: no characters are dropped, only
    /// normalized.
    fn canonicalize(text: &str) -> String {
        let mapped: String = text
            .chars()
            .map(|c| match c {
                '，' => ',',
                '。' => '.',
                '！' => '!',
                '？' => '?',
                '；' => ';',
                '：' => ':',
                '（' => '(',
                '）' => ')',
                '“' | '”' => '"',
                '‘' | '’' => '\'',
                '、' => ',',
                other => other,
            })
            .collect();
        mapped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn canonicalize_messages(messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .cloned()
            .map(|mut m| {
                m.content = Self::canonicalize(&m.content);
                m
            })
            .collect()
    }

    /// Build the full message list for a request: stored conversation
    /// messages (if any) followed by this call's messages, truncated to
    /// `budget = min(model.context_window - max_tokens, context.max_context_tokens)`
    /// (§4.7).
    async fn assemble_messages(
        &self,
        request: &ChatCompletionRequest,
        model: &ModelDescriptor,
    ) -> Vec<Message> {
        let canonical = Self::canonicalize_messages(&request.messages);

        let (mut combined, max_context_tokens) = if let Some(conv_id) = &request.conversation_id {
            match self.get_context(conv_id).await {
                Some(ctx) => {
                    let mut all = ctx.messages.clone();
                    all.extend(canonical);
                    (all, ctx.max_context_tokens)
                }
                None => (canonical, model.context_window_tokens),
            }
        } else {
            (canonical, model.context_window_tokens)
        };

        let max_tokens = request.max_tokens.unwrap_or(model.max_gen_tokens) as usize;
        let window_budget = model.context_window_tokens.saturating_sub(max_tokens);
        let budget = window_budget.min(max_context_tokens);

        combined = tokens::truncate(&combined, budget);
        combined
    }

    // ---- Core operation: chatCompletion (§4.7) ----

    pub async fn chat_completion(&self, request: ChatCompletionRequest) -> Result<RoutedResponse, Error> {
        let Some(model) = self.resolve_model(request.model_name.as_deref()) else {
            return Err(Error::NotFound("no model configured".into()));
        };

        let messages = self.assemble_messages(&request, &model).await;

        if let Some(conv_id) = &request.conversation_id {
            self.append_user_turn(conv_id, &request).await;
        }

        let result = self.dispatch(&model, &messages, &request).await;

        match result {
            Ok(response) => {
                if let Some(conv_id) = &request.conversation_id {
                    let _ = self
                        .append_context_message(conv_id, response.message.clone())
                        .await;
                }
                Ok(RoutedResponse {
                    content: response.message.content,
                    model: response.model,
                    usage: response.usage,
                    fallback: FallbackInfo::default(),
                })
            }
            Err(_backend_err) => {
                self.run_fallback(&model, &messages, &request).await
            }
        }
    }

    async fn dispatch(
        &self,
        model: &ModelDescriptor,
        messages: &[Message],
        request: &ChatCompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let provider = self
            .provider_for(model)
            .ok_or_else(|| ProviderError::NotConfigured(model.endpoint_id.clone()))?;
        let endpoint_prefix = self.endpoint_for(model).and_then(|e| e.model_prefix.clone());
        let wire_model = match endpoint_prefix {
            Some(prefix) => format!("{prefix}{}", model.name),
            None => model.name.clone(),
        };

        let tools = if model.supports_tools {
            self.tool_registry
                .definitions()
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };

        let req = ProviderRequest {
            model: wire_model,
            messages: messages.to_vec(),
            temperature: request.temperature,
            max_tokens: request.max_tokens.or(Some(model.max_gen_tokens)),
            tools,
            stream: false,
            stop: Vec::new(),
        };

        debug!(model = %model.name, endpoint = %model.endpoint_id, "dispatching chat completion");
        provider.complete(req).await
    }

    /// §4.7 fallback cascade. Only reached once the primary dispatch has
    /// already failed.
    async fn run_fallback(
        &self,
        original_model: &ModelDescriptor,
        messages: &[Message],
        request: &ChatCompletionRequest,
    ) -> Result<RoutedResponse, Error> {
        match request.fallback_strategy {
            FallbackStrategy::None => Err(Error::Internal("model backend failed".into())),
            FallbackStrategy::NextModel => {
                for candidate in self.fallback_order(&original_model.name) {
                    warn!(
                        original_model = %original_model.name,
                        fallback_model = %candidate.name,
                        reason = "backend error",
                        "falling back to next model"
                    );
                    if let Ok(response) = self.dispatch(&candidate, messages, request).await {
                        if let Some(conv_id) = &request.conversation_id {
                            let _ = self.append_context_message(conv_id, response.message.clone()).await;
                        }
                        return Ok(RoutedResponse {
                            content: response.message.content,
                            model: response.model,
                            usage: response.usage,
                            fallback: FallbackInfo {
                                fallback_used: true,
                                original_model: Some(original_model.name.clone()),
                                fallback_model: Some(candidate.name.clone()),
                                fallback_type: Some(FallbackStrategy::NextModel),
                            },
                        });
                    }
                }
                self.simple_fallback(original_model, None)
            }
            FallbackStrategy::SimpleResponse => self.simple_fallback(original_model, None),
            FallbackStrategy::CachedResponse => {
                let key = Self::cache_key(messages);
                if let Some(cache) = &self.response_cache {
                    if let Some(cached) = cache.get(&key).await {
                        return Ok(RoutedResponse {
                            content: cached,
                            model: original_model.name.clone(),
                            usage: None,
                            fallback: FallbackInfo {
                                fallback_used: true,
                                original_model: Some(original_model.name.clone()),
                                fallback_model: None,
                                fallback_type: Some(FallbackStrategy::CachedResponse),
                            },
                        });
                    }
                }
                self.simple_fallback(original_model, Some(FallbackStrategy::CachedResponse))
            }
        }
    }

    fn simple_fallback(
        &self,
        original_model: &ModelDescriptor,
        fallback_type: Option<FallbackStrategy>,
    ) -> Result<RoutedResponse, Error> {
        warn!(
            original_model = %original_model.name,
            reason = "all fallback attempts exhausted",
            "degrading to simple response"
        );
        Ok(RoutedResponse {
            content: SIMPLE_FALLBACK_MESSAGE.to_string(),
            model: original_model.name.clone(),
            usage: None,
            fallback: FallbackInfo {
                fallback_used: true,
                original_model: Some(original_model.name.clone()),
                fallback_model: None,
                fallback_type: Some(fallback_type.unwrap_or(FallbackStrategy::SimpleResponse)),
            },
        })
    }

    fn cache_key(messages: &[Message]) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for m in messages {
            m.content.hash(&mut hasher);
        }
        format!("{:x}", hasher.finish())
    }

    // ---- Streaming (§4.7, §5) ----

    pub async fn chat_completion_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, Error> {
        let Some(model) = self.resolve_model(request.model_name.as_deref()) else {
            return Err(Error::NotFound("no model configured".into()));
        };
        let messages = self.assemble_messages(&request, &model).await;
        let provider = self
            .provider_for(&model)
            .ok_or_else(|| Error::NotFound(model.endpoint_id.clone()))?;

        let req = ProviderRequest {
            model: model.name.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens.or(Some(model.max_gen_tokens)),
            tools: Vec::new(),
            stream: true,
            stop: Vec::new(),
        };

        let upstream = provider
            .stream(req)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        // Wrap the upstream receiver so we can accumulate the final content
        // and, on completion, append it to the conversation as an assistant
        // message (§4.7 "Streaming").
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let conversation_id = request.conversation_id.clone();
        let contexts = self.contexts.read().await.get(conversation_id.as_deref().unwrap_or("")).cloned();

        tokio::spawn(async move {
            let mut upstream = upstream;
            let mut accumulated = String::new();
            while let Some(chunk) = upstream.recv().await {
                if let Ok(ref c) = chunk {
                    if let Some(delta) = &c.content {
                        accumulated.push_str(delta);
                    }
                }
                let is_done = matches!(chunk, Ok(ref c) if c.done);
                if tx.send(chunk).await.is_err() {
                    break;
                }
                if is_done {
                    break;
                }
            }
            if let (Some(handle), false) = (contexts, accumulated.is_empty()) {
                let mut ctx = handle.lock().await;
                ctx.append(Message::assistant(accumulated));
            }
        });

        Ok(rx)
    }

    // ---- Tool calls (§4.7, §4.8) ----

    pub async fn tool_call(&self, request: ChatCompletionRequest) -> Result<ToolCallResponse, Error> {
        let Some(model) = self.resolve_model(request.model_name.as_deref()) else {
            return Err(Error::NotFound("no model configured".into()));
        };
        let messages = self.assemble_messages(&request, &model).await;
        let provider = self
            .provider_for(&model)
            .ok_or_else(|| Error::NotFound(model.endpoint_id.clone()))?;

        let req = ProviderRequest {
            model: model.name.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens.or(Some(model.max_gen_tokens)),
            tools: self.tool_registry.definitions(),
            stream: false,
            stop: Vec::new(),
        };

        let response = provider
            .complete(req)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let mut outcomes = Vec::new();
        for call in &response.message.tool_calls {
            let args: serde_json::Value =
                serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null);
            let core_call = CoreToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: args,
            };
            let outcome = match tokio::time::timeout(self.tool_timeout, self.tool_registry.execute(&core_call)).await {
                Ok(Ok(result)) => ToolCallOutcome {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    result: Some(result.output),
                    error: None,
                },
                Ok(Err(e)) => ToolCallOutcome {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    result: None,
                    error: Some(e.to_string()),
                },
                Err(_) => ToolCallOutcome {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    result: None,
                    error: Some("timeout".to_string()),
                },
            };
            outcomes.push(outcome);
        }

        Ok(ToolCallResponse {
            content: response.message.content,
            tool_calls: outcomes,
        })
    }

    // ---- Embeddings (§4.7) ----

    pub async fn embed(&self, text: &str, model_name: Option<&str>) -> Result<Vec<f32>, Error> {
        let model_name = model_name.unwrap_or("text-embedding-default");
        let provider = match self.models.get(model_name) {
            Some(m) => self.provider_for(m),
            None => self.providers.get(&self.default_endpoint_id).cloned(),
        }
        .ok_or_else(|| Error::NotFound(format!("no endpoint for model '{model_name}'")))?;

        let response = provider
            .embed(crm_core::provider::EmbeddingRequest {
                model: model_name.to_string(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("embedding provider returned no vectors".into()))
    }
}

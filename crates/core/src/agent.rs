//! Agent configuration and state types, and the `Agent` lifecycle trait
//! (§4.10: `analyze` → `execute` → `respond`).
//!
//! Concrete specialized agents (sales-support, management-strategy,
//! CRM-best-practices) implement this trait in `crm-agent`; this crate only
//! defines the shapes and the trait boundary so peer crates can depend on
//! "an agent" without depending on any concrete one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for the agent's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default LLM provider to use
    pub default_provider: String,

    /// Default model to use
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temp")]
    pub default_temperature: f32,

    /// Maximum tool call iterations per turn (safety limit)
    #[serde(default = "default_max_iterations")]
    pub max_tool_iterations: u32,

    /// Autonomy level
    #[serde(default)]
    pub autonomy: AutonomyLevel,
}

fn default_temp() -> f32 {
    0.7
}
fn default_max_iterations() -> u32 {
    25
}

/// How much freedom the agent has to act.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Can only read, never execute
    ReadOnly,
    /// Must ask permission for destructive actions (default)
    #[default]
    Supervised,
    /// Full autonomy — execute everything
    Full,
}

/// Runtime state of the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    /// Whether the agent is currently processing a request
    pub is_busy: bool,

    /// Number of requests processed since startup
    pub requests_processed: u64,

    /// Total tokens consumed since startup
    pub total_tokens: u64,

    /// Current active conversations count
    pub active_conversations: usize,
}

/// A declarative capability manifest entry (§3, §4.10). Advertised for
/// external routing; the runtime does not self-enforce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapability {
    pub name: String,
    pub description: String,
    pub params_schema: serde_json::Value,
}

/// Which collaboration fan-out shape the base runtime should use when
/// `Analysis::needs_collaboration` is set (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationType {
    /// Each sub-response feeds the next agent's context.
    Sequential,
    /// Fan out to all required agents concurrently, fan in.
    Parallel,
}

/// Output of `Agent::analyze` (§4.10 step 1). `task_type` is deliberately a
/// string rather than a shared enum: each concrete agent classifies over its
/// own small fixed vocabulary, and nothing outside that agent inspects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub task_type: String,
    pub needs_collaboration: bool,
    #[serde(default)]
    pub required_agents: Vec<String>,
    #[serde(default = "default_collaboration_type")]
    pub collaboration_type: CollaborationType,
    #[serde(default)]
    pub extracted_context: serde_json::Map<String, serde_json::Value>,
}

fn default_collaboration_type() -> CollaborationType {
    CollaborationType::Sequential
}

/// Output of `Agent::execute` (§4.10 step 2). Errors raised during
/// `execute` are caught at the runtime boundary (§7) and converted into a
/// `TaskResult{success:false, fallback_response}` rather than propagating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub response_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_response: Option<String>,
}

impl TaskResult {
    pub fn ok(response_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            response_type: response_type.into(),
            data: Some(data),
            error: None,
            fallback_response: None,
        }
    }

    pub fn failed(error: impl Into<String>, fallback_response: impl Into<String>) -> Self {
        Self {
            success: false,
            response_type: "error".to_string(),
            data: None,
            error: Some(error.into()),
            fallback_response: Some(fallback_response.into()),
        }
    }
}

/// Request envelope exchanged between agents via `AgentCommunicator` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_type: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl AgentMessage {
    pub fn new(message_type: impl Into<String>, sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// Output of `Agent::respond` (§4.10 step 3): a human-readable answer plus
/// the confidence and suggested follow-ups the caller surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    pub confidence: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Abstract peer-dispatch used for agent collaboration (§4.10, §9). Modeled
/// as interface injection rather than agents holding references to each
/// other directly: the concrete implementation holds a weak-style lookup
/// table keyed by agent id, so agents never own each other and there is no
/// ownership cycle (§3 ownership summary).
#[async_trait]
pub trait AgentCommunicator: Send + Sync {
    async fn send(&self, target_agent_id: &str, message: AgentMessage) -> Result<AgentResponse>;
}

/// The uniform three-method lifecycle every concrete agent implements
/// (§4.10). Specialization is by composition (differing classifiers, RAG
/// collections, tool sets, response formatting), never by inheritance (§9).
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn specialty(&self) -> &str;
    fn capabilities(&self) -> &[AgentCapability];

    /// Classify the task. Purely deterministic over `message`; no model
    /// calls unless the concrete agent chooses to make one.
    async fn analyze(&self, message: &AgentMessage) -> Analysis;

    /// Perform the work described by `analysis`. May call the RAG engine,
    /// the model router, peer agents via `communicator`, or tools.
    async fn execute(&self, message: &AgentMessage, analysis: &Analysis) -> TaskResult;

    /// Format a human-readable answer from the task result (and, when
    /// collaboration ran, the aggregated peer response).
    async fn respond(
        &self,
        task_result: &TaskResult,
        collaboration_result: Option<&AgentResponse>,
    ) -> AgentResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autonomy_defaults_to_supervised() {
        let level = AutonomyLevel::default();
        assert!(matches!(level, AutonomyLevel::Supervised));
    }

    #[test]
    fn agent_state_starts_idle() {
        let state = AgentState::default();
        assert!(!state.is_busy);
        assert_eq!(state.requests_processed, 0);
    }
}

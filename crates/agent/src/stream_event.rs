//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps provider-level stream chunks into higher-level
//! events that the gateway can forward to clients over SSE or WebSocket.

use crm_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent during streaming execution.
///
/// These follow the PRD-defined WebSocket protocol:
/// - `chunk`       — partial text token from the LLM
/// - `tool_call`   — agent is invoking a tool
/// - `tool_result` — tool execution completed
/// - `thought`     — ReAct reasoning step
/// - `done`        — stream is complete
/// - `error`       — an error occurred
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text token from the LLM.
    Chunk { content: String },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// A thought / reasoning step (ReAct trace).
    Thought { content: String },

    /// The stream is complete — final metadata.
    Done {
        conversation_id: String,
        usage: Option<Usage>,
        iterations: usize,
        tool_calls_made: usize,
    },

    /// An error occurred mid-stream.
    Error { message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Thought { .. } => "thought",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

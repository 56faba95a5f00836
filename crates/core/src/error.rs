//! Error types for the Crm domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Crm operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Gateway errors (vector store / embedding / rerank) ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Workflow errors ---
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Validation: malformed input, surfaced immediately ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- NotFound: id unknown, surfaced ---
    #[error("Not found: {0}")]
    NotFound(String),

    // --- Cancelled: short-circuits all enclosing operations, no state mutation commits ---
    #[error("Operation cancelled")]
    Cancelled,

    // --- Generic: logic violation, logged with context, surfaced as a generic apology ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Errors from an external retrieval collaborator: the vector store or the
/// embedding/rerank gateway (§4.5, §4.6). In the RAG engine these never
/// propagate to the caller — they degrade to an empty retrieval or a
/// low-confidence answer (§4.9, §7).
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Gateway call timed out after {0}s")]
    Timeout(u64),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors raised by the Discovery Workflow stage engine (§4.12).
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error(
        "Stage precondition not met: {stage} requires results from a prior stage that have not \
         been populated"
    )]
    PreconditionNotMet { stage: String },

    #[error("Index {index} out of range (len={len})")]
    IndexOutOfRange { index: usize, len: usize },
}

//! Configuration loading, validation, and management for Crm.
//!
//! Loads configuration from `~/.crm/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.crm/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Autonomy and security settings
    #[serde(default)]
    pub autonomy: AutonomyConfig,

    /// Runtime configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Identity configuration
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Secrets configuration
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// RAG engine defaults (chunking, fusion, retrieval mode, token budget)
    #[serde(default)]
    pub rag: RagDefaults,

    /// Per-tool-call timeout, in seconds, enforced by the tool registry
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Telemetry, cost tracking, and budget configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output: show first 4 chars + "***".
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("memory", &self.memory)
            .field("autonomy", &self.autonomy)
            .field("runtime", &self.runtime)
            .field("providers", &self.providers)
            .field("identity", &self.identity)
            .field("secrets", &self.secrets)
            .field("rag", &self.rag)
            .field("tool_timeout_secs", &self.tool_timeout_secs)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    #[serde(default = "default_true")]
    pub auto_save: bool,

    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_embedding_provider() -> String {
    "none".into()
}
fn default_vector_weight() -> f32 {
    0.7
}
fn default_keyword_weight() -> f32 {
    0.3
}
fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            auto_save: true,
            embedding_provider: default_embedding_provider(),
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
        }
    }
}

/// RAG engine defaults, mapped directly onto `crm_core::rag::RagConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagDefaults {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,

    #[serde(default = "default_context_window_tokens")]
    pub context_window_tokens: usize,

    #[serde(default = "default_true")]
    pub enable_rerank: bool,

    #[serde(default = "default_true")]
    pub enable_fusion: bool,

    #[serde(default = "default_rag_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_gen_tokens")]
    pub max_gen_tokens: u32,
}

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_top_k() -> usize {
    10
}
fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_rerank_top_k() -> usize {
    5
}
fn default_context_window_tokens() -> usize {
    4000
}
fn default_rag_temperature() -> f32 {
    0.1
}
fn default_max_gen_tokens() -> u32 {
    1000
}

impl Default for RagDefaults {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            rerank_top_k: default_rerank_top_k(),
            context_window_tokens: default_context_window_tokens(),
            enable_rerank: true,
            enable_fusion: true,
            temperature: default_rag_temperature(),
            max_gen_tokens: default_max_gen_tokens(),
        }
    }
}

impl From<&RagDefaults> for crm_core::rag::RagConfig {
    fn from(d: &RagDefaults) -> Self {
        Self {
            chunk_size: d.chunk_size,
            chunk_overlap: d.chunk_overlap,
            top_k: d.top_k,
            similarity_threshold: d.similarity_threshold,
            rerank_top_k: d.rerank_top_k,
            context_window_tokens: d.context_window_tokens,
            enable_rerank: d.enable_rerank,
            enable_fusion: d.enable_fusion,
            temperature: d.temperature,
            max_gen_tokens: d.max_gen_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    #[serde(default = "default_autonomy_level")]
    pub level: String,

    #[serde(default = "default_true")]
    pub workspace_only: bool,

    #[serde(default)]
    pub allowed_commands: Vec<String>,

    #[serde(default)]
    pub forbidden_paths: Vec<String>,

    #[serde(default)]
    pub allowed_roots: Vec<String>,
}

fn default_autonomy_level() -> String {
    "supervised".into()
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            level: default_autonomy_level(),
            workspace_only: true,
            allowed_commands: vec![
                "git".into(),
                "npm".into(),
                "cargo".into(),
                "ls".into(),
                "cat".into(),
                "grep".into(),
            ],
            forbidden_paths: vec![
                "/etc".into(),
                "/root".into(),
                "/proc".into(),
                "/sys".into(),
                "~/.ssh".into(),
                "~/.gnupg".into(),
                "~/.aws".into(),
            ],
            allowed_roots: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_runtime_kind")]
    pub kind: String,
}

fn default_runtime_kind() -> String {
    "native".into()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kind: default_runtime_kind(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_format")]
    pub format: String,

    /// Override the system prompt entirely (skips file loading)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,

    /// Additional context files to load (absolute paths)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_context_files: Vec<String>,

    /// Whether to load project-local .crm/ context (default: true)
    #[serde(default = "default_true")]
    pub load_project_context: bool,
}

fn default_identity_format() -> String {
    "crm".into()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            format: default_identity_format(),
            system_prompt_override: None,
            extra_context_files: vec![],
            load_project_context: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_true")]
    pub encrypt: bool,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self { encrypt: true }
    }
}

fn default_deny() -> String {
    "deny".into()
}

/// Telemetry, cost tracking, and budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether telemetry is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Spending budgets
    #[serde(default)]
    pub budgets: Vec<BudgetConfig>,

    /// Custom model pricing overrides (model name â†’ pricing)
    #[serde(default)]
    pub custom_pricing: HashMap<String, PricingOverrideConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            budgets: vec![],
            custom_pricing: HashMap::new(),
        }
    }
}

/// A spending budget limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Scope: "per_request", "per_session", "daily", "monthly", "total"
    pub scope: String,

    /// Maximum spend in USD
    pub max_usd: f64,

    /// Maximum tokens (0 = unlimited)
    #[serde(default)]
    pub max_tokens: u64,

    /// Action when exceeded: "deny" or "warn"
    #[serde(default = "default_deny")]
    pub on_exceed: String,
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

impl AppConfig {
    /// Load configuration from the default path (~/.crm/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `CRM_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = Self::config_dir();
        let config_path = config_dir.join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("CRM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        // Allow env var to override default provider
        if let Ok(provider) = std::env::var("CRM_PROVIDER") {
            config.default_provider = provider;
        }

        // Allow env var to override default model
        if let Ok(model) = std::env::var("CRM_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".crm")
    }

    /// Get the workspace directory path.
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.vector_weight + self.memory.keyword_weight <= 0.0 {
            return Err(ConfigError::ValidationError(
                "vector_weight + keyword_weight must be > 0".into(),
            ));
        }

        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(ConfigError::ValidationError(
                "rag.chunk_overlap must be smaller than rag.chunk_size".into(),
            ));
        }

        for (name, provider) in &self.providers {
            if provider.api_url.as_deref().is_some_and(str::is_empty) {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{name}.api_url must not be empty when set"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            memory: MemoryConfig::default(),
            autonomy: AutonomyConfig::default(),
            runtime: RuntimeConfig::default(),
            providers: HashMap::new(),
            identity: IdentityConfig::default(),
            secrets: SecretsConfig::default(),
            rag: RagDefaults::default(),
            tool_timeout_secs: default_tool_timeout_secs(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.rag.chunk_size, 512);
        assert!(config.autonomy.workspace_only);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.rag.chunk_size, config.rag.chunk_size);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("chunk_size"));
    }

    #[test]
    fn rag_defaults_convert_into_core_rag_config() {
        let defaults = RagDefaults::default();
        let core_config: crm_core::rag::RagConfig = (&defaults).into();
        assert_eq!(core_config.chunk_size, defaults.chunk_size);
        assert_eq!(core_config.top_k, defaults.top_k);
    }

    #[test]
    fn chunk_overlap_must_be_smaller_than_chunk_size() {
        let config = AppConfig {
            rag: RagDefaults {
                chunk_overlap: 600,
                chunk_size: 512,
                ..RagDefaults::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tool_timeout_has_a_sane_default() {
        let config = AppConfig::default();
        assert_eq!(config.tool_timeout_secs, 30);
    }
}

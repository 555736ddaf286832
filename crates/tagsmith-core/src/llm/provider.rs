//! LLM provider trait and request/response types.
//!
//! Defines the interface a structured-output language model backend
//! implements, plus the factory that builds one for a given endpoint.

use crate::config::LlmConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use std::time::Duration;

/// Where to send a decomposition request.
///
/// Built per call so one process can talk to several endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmTarget {
    /// Base URL (`https://host/v1`) or full chat-completions URL
    pub endpoint: String,
    /// Model identifier passed through to the endpoint
    pub model: String,
    /// Bearer credential; `None` for endpoints that need none
    pub api_key: Option<String>,
}

impl LlmTarget {
    /// Target from the `[llm]` config section, resolving `${ENV}` credentials.
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: resolve_env_var(&config.api_key),
        }
    }
}

/// A single system+user prompt exchange.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Instructions and output contract
    pub system: String,
    /// The user's text
    pub user: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Ask the endpoint to constrain output to a JSON object
    pub json: bool,
}

/// The response from an LLM call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text
    pub text: String,
    /// Model identifier used
    pub model: String,
    /// Number of tokens used (input + output), if reported
    pub tokens_used: Option<u32>,
    /// Round-trip latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers implement.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (we need `Box<dyn LlmProvider>` for dynamic dispatch).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Run one completion. Callers get exactly one attempt.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, PipelineError>;

    /// Per-request timeout for this provider.
    fn timeout(&self) -> Duration;
}

/// Resolve `${ENV_VAR}` references in config strings.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Builds providers for a target.
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Every supported endpoint speaks the OpenAI chat-completions protocol.
    pub fn create(target: &LlmTarget, timeout: Duration) -> Box<dyn LlmProvider> {
        Box::new(super::openai::OpenAiProvider::new(target, timeout))
    }
}

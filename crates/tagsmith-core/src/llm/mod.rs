//! Language model integration for query decomposition.
//!
//! Provides a provider abstraction over OpenAI-compatible chat endpoints.
//! One call is made per resolution and it is never retried.

pub mod openai;
pub mod provider;

pub use provider::{
    resolve_env_var, LlmProvider, LlmProviderFactory, LlmRequest, LlmResponse, LlmTarget,
};

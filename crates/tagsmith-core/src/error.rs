//! Error types for the Tagsmith inference and resolution pipelines.
//!
//! Errors are organized by stage so a caller can tell a missing image from a
//! model that failed to load, a device failure, or a language model that
//! ignored the output contract, without inspecting internals.

use thiserror::Error;

use crate::models::ModelKind;

/// Top-level error type for Tagsmith operations.
#[derive(Error, Debug)]
pub enum TagsmithError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The requested image or resource does not exist or could not be read
    #[error("Retrieval failed for {object}: {message}")]
    Retrieval { object: String, message: String },

    /// Image bytes were fetched but could not be decoded
    #[error("Decode error for {object}: {message}")]
    Decode { object: String, message: String },

    /// A model artifact could not be fetched or a session could not be built
    #[error("Failed to load {model} model: {message}")]
    ModelLoad { model: ModelKind, message: String },

    /// A loaded model failed while running
    #[error("{model} inference failed: {message}")]
    Inference { model: ModelKind, message: String },

    /// Input rejected before any inference ran
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The language model returned output that does not match the query schema
    #[error("Query decomposition failed: {message}")]
    Decomposition { message: String },

    /// Transport-level failure talking to the language model endpoint
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        /// HTTP status code, when the failure came from an HTTP response
        status_code: Option<u16>,
    },

    /// The persisted vector store failed
    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {object} after {timeout_ms}ms")]
    Timeout {
        object: String,
        stage: String,
        timeout_ms: u64,
    },

    /// File exceeds size limit
    #[error("File too large: {object} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        object: String,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {object} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        object: String,
        width: u32,
        height: u32,
        max_dim: u32,
    },
}

impl PipelineError {
    /// Whether retrying the same call later may succeed.
    ///
    /// Only model-load failures qualify: the model manager never caches a
    /// failed load, so the next lazy access tries again. Everything else is
    /// terminal for the request.
    pub fn is_retryable_load(&self) -> bool {
        matches!(self, PipelineError::ModelLoad { .. })
    }

    /// Shorthand for an inference failure on the given model.
    pub(crate) fn inference(model: ModelKind, message: impl Into<String>) -> Self {
        PipelineError::Inference {
            model,
            message: message.into(),
        }
    }

    /// Shorthand for a load failure on the given model.
    pub(crate) fn model_load(model: ModelKind, message: impl Into<String>) -> Self {
        PipelineError::ModelLoad {
            model,
            message: message.into(),
        }
    }

    pub(crate) fn store(message: impl Into<String>) -> Self {
        PipelineError::VectorStore {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Tagsmith results.
pub type Result<T> = std::result::Result<T, TagsmithError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_load_is_retryable() {
        let err = PipelineError::model_load(ModelKind::ImageTagger, "missing artifact");
        assert!(err.is_retryable_load());
    }

    #[test]
    fn test_inference_is_terminal() {
        let err = PipelineError::inference(ModelKind::DualEncoder, "device lost");
        assert!(!err.is_retryable_load());
    }

    #[test]
    fn test_messages_name_stage_and_model() {
        let err = PipelineError::model_load(ModelKind::TextEmbedder, "no such file");
        let msg = err.to_string();
        assert!(msg.contains("text embedder"));
        assert!(msg.contains("no such file"));

        let err = PipelineError::Retrieval {
            object: "a/b.png".into(),
            message: "not found".into(),
        };
        assert!(err.to_string().contains("a/b.png"));
    }

    #[test]
    fn test_pipeline_error_converts_to_top_level() {
        let err: TagsmithError = PipelineError::Decomposition {
            message: "missing field `positive`".into(),
        }
        .into();
        assert!(err.to_string().starts_with("Pipeline error"));
    }
}

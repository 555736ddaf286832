//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::device::DevicePreference;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where model artifacts are cached
    pub model_dir: PathBuf,

    /// Execution backend: "auto", "cuda" or "cpu"
    pub device: DevicePreference,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.tagsmith/models"),
            device: DevicePreference::Auto,
        }
    }
}

/// Model hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Base URL of a Hugging Face compatible hub
    pub endpoint: String,

    /// Never download; fail when an artifact is missing locally
    pub offline: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            offline: false,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 10000,
            decode_timeout_ms: 5000,
        }
    }
}

/// Image auto-tagging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Minimum sigmoid probability for a class to be reported
    pub threshold: f32,

    /// Maximum number of tags kept per category
    pub max_per_category: usize,

    /// When fewer classes clear the threshold, report this many top classes instead
    pub min_results: usize,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.61,
            max_per_category: 50,
            min_results: 5,
        }
    }
}

/// Free-text to canonical tag matching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum cosine similarity for a candidate to resolve to a canonical tag
    pub threshold: f32,

    /// Number of tag names embedded per batch during a vocabulary rebuild
    pub rebuild_batch_size: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            rebuild_batch_size: 64,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database holding canonical tags and their vectors
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "~/.tagsmith/tags.db".to_string(),
        }
    }
}

/// Image source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Directory that object identifiers are resolved against
    pub root: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            root: "~/.tagsmith/images".to_string(),
        }
    }
}

/// Language model endpoint used for query decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (or full chat completions URL)
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// API key; `${VAR}` reads the key from the environment
    pub api_key: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: "${OPENAI_API_KEY}".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            timeout_ms: 60000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

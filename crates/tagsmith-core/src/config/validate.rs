//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.tagging.threshold) {
            return Err(ConfigError::ValidationError(
                "tagging.threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.tagging.max_per_category == 0 {
            return Err(ConfigError::ValidationError(
                "tagging.max_per_category must be > 0".into(),
            ));
        }
        if self.tagging.min_results == 0 {
            return Err(ConfigError::ValidationError(
                "tagging.min_results must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.matching.threshold) {
            return Err(ConfigError::ValidationError(
                "matching.threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.matching.rebuild_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "matching.rebuild_batch_size must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.llm.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "llm.timeout_ms must be > 0".into(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "llm.max_tokens must be > 0".into(),
            ));
        }
        if self.hub.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "hub.endpoint must not be empty".into(),
            ));
        }
        Ok(())
    }
}

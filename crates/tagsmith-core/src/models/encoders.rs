//! [`TextEncoder`] adapters over the shared [`ModelManager`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::matching::TextEncoder;

use super::{ModelKind, ModelManager};

/// Sentence embedder for tag-to-tag similarity (CPU, ungated).
#[derive(Clone)]
pub struct TagTextEncoder {
    models: Arc<ModelManager>,
}

impl TagTextEncoder {
    pub fn new(models: Arc<ModelManager>) -> Self {
        Self { models }
    }
}

#[async_trait]
impl TextEncoder for TagTextEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        self.models
            .embed_tags(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PipelineError::inference(ModelKind::TextEmbedder, "Empty embedding batch")
            })
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        self.models.embed_tags(texts.to_vec()).await
    }
}

/// Dual-encoder text tower, for queries compared against image vectors.
#[derive(Clone)]
pub struct QueryTextEncoder {
    models: Arc<ModelManager>,
}

impl QueryTextEncoder {
    pub fn new(models: Arc<ModelManager>) -> Self {
        Self { models }
    }
}

#[async_trait]
impl TextEncoder for QueryTextEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        self.models.encode_query_text(text).await
    }
}

//! Free-text to canonical tag matching.
//!
//! Canonical tags are stored as sentence vectors; a candidate string is
//! normalized, embedded with the same encoder, and matched top-1 against the
//! store with a similarity floor.

pub mod matcher;
pub mod store;
pub mod vocabulary;

use async_trait::async_trait;

use crate::error::PipelineError;

pub use matcher::{normalize_candidate, TagMatcher};
pub use store::{Neighbor, SqliteVectorStore, VectorStore};
pub use vocabulary::{rebuild_vocabulary, RebuildReport};

/// Anything that turns text into a fixed-length vector.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, PipelineError>;

    /// Encode several texts. The default encodes one at a time.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.encode(text).await?);
        }
        Ok(out)
    }
}

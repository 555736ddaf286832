//! Re-embedding the canonical vocabulary.
//!
//! Every stored tag name is normalized the same way candidates are, encoded
//! in batches, and handed to the store in one atomic replace. Nothing in the
//! store changes until all encoding succeeded, so a failed rebuild leaves the
//! previous vectors in place and running it twice gives the same result.

use std::time::Instant;

use serde::Serialize;

use crate::error::PipelineError;

use super::{normalize_candidate, TextEncoder, VectorStore};

/// Outcome of a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Tag names read from the store
    pub total: usize,
    /// Tags that now have a vector
    pub vectorized: usize,
    /// Names that normalize to nothing and were left without a vector
    pub skipped: usize,
    /// Vector length, 0 when nothing was vectorized
    pub dimensions: usize,
}

/// Clear every stored vector and re-embed all canonical tag names.
pub async fn rebuild_vocabulary(
    encoder: &dyn TextEncoder,
    store: &dyn VectorStore,
    batch_size: usize,
) -> Result<RebuildReport, PipelineError> {
    let start = Instant::now();
    let batch_size = batch_size.max(1);
    let names = store.tag_names().await?;

    let mut canonical = Vec::with_capacity(names.len());
    let mut texts = Vec::with_capacity(names.len());
    let mut skipped = 0;
    for name in &names {
        match normalize_candidate(name) {
            Ok(text) => {
                canonical.push(name.clone());
                texts.push(text);
            }
            Err(_) => {
                tracing::warn!("Skipping tag {:?}: nothing left after normalization", name);
                skipped += 1;
            }
        }
    }

    tracing::info!("Encoding {} canonical tags...", texts.len());

    let mut vectors = Vec::with_capacity(texts.len());
    for (batch_idx, chunk) in texts.chunks(batch_size).enumerate() {
        let embeddings = encoder.encode_batch(chunk).await?;
        if embeddings.len() != chunk.len() {
            return Err(PipelineError::store(format!(
                "Encoder returned {} vectors for a batch of {}",
                embeddings.len(),
                chunk.len()
            )));
        }
        vectors.extend(embeddings);

        let encoded = (batch_idx + 1) * batch_size;
        if encoded % 5000 < batch_size || encoded >= texts.len() {
            tracing::info!(
                "  Encoded {}/{} tags",
                encoded.min(texts.len()),
                texts.len()
            );
        }
    }

    let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
    let vectorized = vectors.len();
    store
        .replace_vectors(canonical.into_iter().zip(vectors).collect())
        .await?;

    tracing::info!(
        "Vocabulary rebuilt: {} tags x {} dims in {:?}",
        vectorized,
        dimensions,
        start.elapsed()
    );

    Ok(RebuildReport {
        total: names.len(),
        vectorized,
        skipped,
        dimensions,
    })
}

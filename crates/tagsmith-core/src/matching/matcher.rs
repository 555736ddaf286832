//! Top-1 canonical tag lookup for a free-text candidate.

use std::sync::Arc;
use std::time::Instant;

use crate::error::PipelineError;
use crate::types::TagMatch;

use super::{TextEncoder, VectorStore};

/// Bring a candidate into the form canonical tags are embedded in.
///
/// Lowercases, turns underscores into spaces and drops parentheses, so
/// `"Cat_Ears"`, `"cat ears"` and `"cat_ears()"` all become `"cat ears"`.
pub fn normalize_candidate(candidate: &str) -> Result<String, PipelineError> {
    let normalized: String = candidate
        .to_lowercase()
        .chars()
        .filter(|c| *c != '(' && *c != ')')
        .map(|c| if c == '_' { ' ' } else { c })
        .collect();
    let normalized = normalized.trim().to_string();

    if normalized.is_empty() {
        return Err(PipelineError::InvalidInput {
            message: format!("Tag candidate {candidate:?} is empty after normalization"),
        });
    }
    Ok(normalized)
}

/// Matches candidates against the canonical vocabulary.
#[derive(Clone)]
pub struct TagMatcher {
    encoder: Arc<dyn TextEncoder>,
    store: Arc<dyn VectorStore>,
}

impl TagMatcher {
    pub fn new(encoder: Arc<dyn TextEncoder>, store: Arc<dyn VectorStore>) -> Self {
        Self { encoder, store }
    }

    pub fn encoder(&self) -> &Arc<dyn TextEncoder> {
        &self.encoder
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Closest canonical tag whose similarity is at least `threshold`.
    ///
    /// `Ok(None)` means no tag was close enough, or the vocabulary has no
    /// vectors; it is not an error.
    pub async fn match_tag(
        &self,
        candidate: &str,
        threshold: f32,
    ) -> Result<Option<TagMatch>, PipelineError> {
        let start = Instant::now();
        let normalized = normalize_candidate(candidate)?;
        let vector = self.encoder.encode(&normalized).await?;

        let Some(best) = self.store.nearest(&vector, 1).await?.into_iter().next() else {
            tracing::debug!("No vectorized tags to match {:?} against", candidate);
            return Ok(None);
        };

        let similarity = best.similarity();
        tracing::debug!(
            "Matched {:?} -> {:?} ({:.3}) in {:?}",
            candidate,
            best.tag,
            similarity,
            start.elapsed()
        );

        if similarity >= threshold {
            Ok(Some(TagMatch {
                tag: best.tag,
                similarity,
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_variants_agree() {
        let expected = "cat ears";
        assert_eq!(normalize_candidate("Cat_Ears").unwrap(), expected);
        assert_eq!(normalize_candidate("cat ears").unwrap(), expected);
        assert_eq!(normalize_candidate("cat_ears()").unwrap(), expected);
    }

    #[test]
    fn test_normalization_of_qualifiers() {
        assert_eq!(
            normalize_candidate("Saber_(Fate)").unwrap(),
            "saber fate"
        );
    }

    #[test]
    fn test_empty_candidates_are_input_errors() {
        for candidate in ["", "   ", "()", "_"] {
            let err = normalize_candidate(candidate).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidInput { .. }),
                "{candidate:?}"
            );
        }
    }
}

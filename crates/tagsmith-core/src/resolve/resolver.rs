//! Free-text query to canonical tags (plus an optional residual vector).
//!
//! 1. One language-model call splits the query into wanted and unwanted
//!    keywords, each with ordered candidate tags, and a residual description.
//! 2. Each keyword takes the first candidate the matcher accepts.
//! 3. The residual description, if any, is embedded with the dual encoder's
//!    text tower so it can be compared against image vectors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::LlmConfig;
use crate::error::PipelineError;
use crate::llm::{LlmProvider, LlmProviderFactory, LlmTarget};
use crate::matching::{TagMatcher, TextEncoder};
use crate::types::{ResolvedTags, SemanticResolution};

use super::prompt::decomposition_request;
use super::schema::{KeywordGroup, ParsedSemanticQuery};

/// Default similarity floor for candidate matching.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.9;

/// Resolves semantic queries against the canonical vocabulary.
pub struct QueryResolver {
    matcher: TagMatcher,
    query_encoder: Arc<dyn TextEncoder>,
    llm: LlmConfig,
    match_threshold: f32,
    embed_residual: bool,
}

impl QueryResolver {
    pub fn new(matcher: TagMatcher, query_encoder: Arc<dyn TextEncoder>, llm: LlmConfig) -> Self {
        Self {
            matcher,
            query_encoder,
            llm,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            embed_residual: true,
        }
    }

    pub fn with_match_threshold(mut self, threshold: f32) -> Self {
        self.match_threshold = threshold;
        self
    }

    /// Skip embedding the residual description.
    pub fn with_residual_embedding(mut self, enabled: bool) -> Self {
        self.embed_residual = enabled;
        self
    }

    pub fn matcher(&self) -> &TagMatcher {
        &self.matcher
    }

    /// Resolve `query` using an OpenAI-compatible endpoint.
    pub async fn resolve(
        &self,
        query: &str,
        target: &LlmTarget,
    ) -> Result<SemanticResolution, PipelineError> {
        let provider =
            LlmProviderFactory::create(target, Duration::from_millis(self.llm.timeout_ms));
        self.resolve_with(query, provider.as_ref()).await
    }

    /// Resolve `query` with an explicit provider.
    pub async fn resolve_with(
        &self,
        query: &str,
        provider: &dyn LlmProvider,
    ) -> Result<SemanticResolution, PipelineError> {
        if query.trim().is_empty() {
            return Ok(SemanticResolution::default());
        }
        let start = Instant::now();

        let parsed = self.decompose(query, provider).await?;

        let tags = ResolvedTags {
            positive: self.resolve_groups(&parsed.positive, "positive").await,
            negative: self.resolve_groups(&parsed.negative, "negative").await,
        };

        let embedding = match (&parsed.residual_text, self.embed_residual) {
            (Some(text), true) => Some(self.query_encoder.encode(text).await?),
            _ => None,
        };

        tracing::info!(
            "Resolved query into {} positive, {} negative tags in {:?}",
            tags.positive.len(),
            tags.negative.len(),
            start.elapsed()
        );

        Ok(SemanticResolution {
            tags,
            residual_text: parsed.residual_text,
            embedding,
        })
    }

    /// Run the decomposition call and validate its output.
    pub async fn decompose(
        &self,
        query: &str,
        provider: &dyn LlmProvider,
    ) -> Result<ParsedSemanticQuery, PipelineError> {
        let request = decomposition_request(query, &self.llm);
        let response = provider.generate(&request).await?;
        tracing::debug!(
            "{} decomposed query in {}ms ({:?} tokens)",
            provider.name(),
            response.latency_ms,
            response.tokens_used
        );
        ParsedSemanticQuery::parse(&response.text)
    }

    /// First-match-wins over each keyword's candidates.
    ///
    /// A matcher failure only costs that keyword its match.
    async fn resolve_groups(&self, groups: &[KeywordGroup], polarity: &str) -> Vec<String> {
        let mut resolved = Vec::new();

        for group in groups {
            for candidate in &group.candidates {
                match self.matcher.match_tag(candidate, self.match_threshold).await {
                    Ok(Some(found)) => {
                        tracing::debug!(
                            "{} keyword {:?}: {:?} -> {:?} ({:.3})",
                            polarity,
                            group.keyword,
                            candidate,
                            found.tag,
                            found.similarity
                        );
                        resolved.push(found.tag);
                        break;
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(
                            "Matching {:?} for {} keyword {:?} failed, skipping keyword: {}",
                            candidate,
                            polarity,
                            group.keyword,
                            e
                        );
                        break;
                    }
                }
            }
        }

        resolved
    }

    /// Dual-encoder embedding of a whole query; `None` for empty text.
    pub async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>, PipelineError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        self.query_encoder.encode(text).await.map(Some)
    }
}

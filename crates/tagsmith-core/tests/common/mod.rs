//! In-process fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tagsmith_core::llm::{LlmProvider, LlmRequest, LlmResponse};
use tagsmith_core::matching::{rebuild_vocabulary, SqliteVectorStore, TagMatcher, TextEncoder};
use tagsmith_core::PipelineError;

pub const DIMS: usize = 4;

/// Vector every unknown text maps to. Orthogonal to all axis vectors below.
pub const UNKNOWN: [f32; DIMS] = [0.0, 0.0, 0.0, 1.0];

pub fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    v[i] = 1.0;
    v
}

/// Lookup-table encoder keyed by normalized text.
pub struct FakeEncoder {
    vectors: HashMap<String, Vec<f32>>,
    fail_on: Option<String>,
    calls: AtomicUsize,
}

impl FakeEncoder {
    pub fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            vectors: entries
                .iter()
                .map(|(text, v)| (text.to_string(), v.clone()))
                .collect(),
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail whenever `text` is encoded.
    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextEncoder for FakeEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(text) {
            return Err(PipelineError::InvalidInput {
                message: format!("cannot encode {text:?}"),
            });
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_vec()))
    }
}

/// Provider that answers every request with the same text.
pub struct ScriptedLlm {
    reply: Result<String, u16>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_with(status: u16) -> Self {
        Self {
            reply: Err(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(text) => Ok(LlmResponse {
                text: text.clone(),
                model: "scripted".to_string(),
                tokens_used: None,
                latency_ms: 0,
            }),
            Err(status) => Err(PipelineError::Llm {
                message: format!("HTTP {status}"),
                status_code: Some(*status),
            }),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }
}

/// In-memory store holding `tags`, vectorized with `encoder`.
pub async fn vocabulary(tags: &[&str], encoder: &dyn TextEncoder) -> Arc<SqliteVectorStore> {
    let store = Arc::new(SqliteVectorStore::open_in_memory().unwrap());
    store
        .insert_tags(tags.iter().map(|t| t.to_string()).collect())
        .await
        .unwrap();
    rebuild_vocabulary(encoder, store.as_ref(), 16).await.unwrap();
    store
}

pub fn matcher(encoder: Arc<FakeEncoder>, store: Arc<SqliteVectorStore>) -> TagMatcher {
    TagMatcher::new(encoder, store)
}

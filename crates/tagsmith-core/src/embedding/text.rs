//! Sentence embedder used for tag-to-tag similarity.
//!
//! MiniLM-L6 produces per-token hidden states; a sentence vector is the
//! attention-masked mean of those states, L2-normalized to 384 dimensions.
//! It runs on the CPU and never touches the shared accelerator.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Value;

use crate::device::{build_session, DeviceKind};
use crate::error::PipelineError;
use crate::models::ModelKind;

const MODEL: ModelKind = ModelKind::TextEmbedder;

/// Longest token sequence fed to the model.
const MAX_TOKENS: usize = 256;

/// MiniLM sentence embedder.
///
/// Uses the same `Mutex<Session>` pattern as the image towers.
pub struct TextEmbedder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    wants_token_types: bool,
}

impl TextEmbedder {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self, PipelineError> {
        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            PipelineError::model_load(MODEL, format!("Failed to load tokenizer: {e}"))
        })?;

        let session = build_session(MODEL, model_path, DeviceKind::Cpu)?;
        let wants_token_types = session
            .inputs()
            .iter()
            .any(|i| i.name() == "token_type_ids");

        tracing::info!("Text embedder ready on cpu");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            wants_token_types,
        })
    }

    /// Embed one string.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        self.encode_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PipelineError::inference(MODEL, "Embedder returned empty result for single input")
            })
    }

    /// Embed a batch of strings, padded to the longest sequence.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(PipelineError::InvalidInput {
                message: format!("Cannot embed empty text at batch position {pos}"),
            });
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| PipelineError::inference(MODEL, format!("Tokenization failed: {e}")))?;

        let batch_size = texts.len();
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(MAX_TOKENS))
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        for (i, encoding) in encodings.iter().enumerate() {
            for (j, &id) in encoding.get_ids().iter().take(seq_len).enumerate() {
                input_ids[i * seq_len + j] = id as i64;
                attention_mask[i * seq_len + j] = 1;
            }
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let tensor = |name: &str, data: Vec<i64>| {
            Value::from_array((shape.clone(), data)).map_err(|e| {
                PipelineError::inference(MODEL, format!("Failed to create {name} tensor: {e}"))
            })
        };
        let ids_value = tensor("input_ids", input_ids)?;
        let mask_value = tensor("attention_mask", attention_mask.clone())?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::inference(MODEL, format!("Session lock poisoned: {e}")))?;

        let run = if self.wants_token_types {
            let types_value = tensor("token_type_ids", vec![0i64; batch_size * seq_len])?;
            session.run(ort::inputs![
                "input_ids" => ids_value,
                "attention_mask" => mask_value,
                "token_type_ids" => types_value
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_value,
                "attention_mask" => mask_value
            ])
        };
        let outputs =
            run.map_err(|e| PipelineError::inference(MODEL, format!("Inference failed: {e}")))?;

        let hidden = outputs
            .iter()
            .find(|(name, _)| *name == "last_hidden_state")
            .or_else(|| outputs.iter().next())
            .ok_or_else(|| PipelineError::inference(MODEL, "Model produced no outputs"))?;

        let (shape, data) = hidden.1.try_extract_tensor::<f32>().map_err(|e| {
            PipelineError::inference(MODEL, format!("Failed to extract hidden states: {e}"))
        })?;

        if shape.len() != 3 || shape[0] as usize != batch_size || shape[1] as usize != seq_len {
            return Err(PipelineError::inference(
                MODEL,
                format!("Unexpected hidden state shape: {:?}", shape),
            ));
        }
        let dim = shape[2] as usize;

        Ok(mean_pool(data, &attention_mask, batch_size, seq_len, dim))
    }
}

/// Attention-masked mean over the token axis, L2-normalized per row.
///
/// `hidden` is `[batch, seq, dim]` row-major, `mask` is `[batch, seq]`.
fn mean_pool(
    hidden: &[f32],
    mask: &[i64],
    batch_size: usize,
    seq_len: usize,
    dim: usize,
) -> Vec<Vec<f32>> {
    (0..batch_size)
        .map(|b| {
            let mut pooled = vec![0.0f32; dim];
            let mut count = 0.0f32;
            for t in 0..seq_len {
                if mask[b * seq_len + t] == 0 {
                    continue;
                }
                let offset = (b * seq_len + t) * dim;
                for (acc, &v) in pooled.iter_mut().zip(&hidden[offset..offset + dim]) {
                    *acc += v;
                }
                count += 1.0;
            }
            let count = count.max(1e-9);
            for v in pooled.iter_mut() {
                *v /= count;
            }
            crate::math::l2_normalize_in_place(&mut pooled);
            pooled
        })
        .collect()
}

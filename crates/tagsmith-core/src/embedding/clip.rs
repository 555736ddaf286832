//! CLIP dual encoder: image and text towers sharing one embedding space.
//!
//! Both towers are separate ONNX graphs with projection heads baked in, so
//! `image_embeds` and `text_embeds` come out directly comparable after
//! L2 normalization.

use std::path::Path;
use std::sync::Mutex;

use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

use crate::device::{build_session, DeviceKind};
use crate::error::PipelineError;
use crate::models::ModelKind;

use super::preprocess::{preprocess, CLIP_IMAGE_SIZE};

const MODEL: ModelKind = ModelKind::DualEncoder;

/// CLIP context length.
const MAX_TOKENS: usize = 77;

/// Paths of the three files the encoder is built from.
pub struct DualEncoderFiles<'a> {
    pub vision_model: &'a Path,
    pub text_model: &'a Path,
    pub tokenizer: &'a Path,
}

/// Wraps both CLIP towers and the BPE tokenizer.
///
/// Uses a `Mutex` per session because `Session::run` requires `&mut self`.
pub struct DualEncoder {
    vision: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    vision_input: String,
    text_inputs: Vec<String>,
    device: DeviceKind,
}

impl DualEncoder {
    pub fn load(files: DualEncoderFiles<'_>, device: DeviceKind) -> Result<Self, PipelineError> {
        let tokenizer = tokenizers::Tokenizer::from_file(files.tokenizer).map_err(|e| {
            PipelineError::model_load(MODEL, format!("Failed to load tokenizer: {e}"))
        })?;

        let vision = build_session(MODEL, files.vision_model, device)?;
        let text = build_session(MODEL, files.text_model, device)?;

        let vision_input = vision
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());
        let text_inputs = text.inputs().iter().map(|i| i.name().to_string()).collect();

        tracing::info!("Dual encoder ready on {}", device);

        Ok(Self {
            vision: Mutex::new(vision),
            text: Mutex::new(text),
            tokenizer,
            vision_input,
            text_inputs,
            device,
        })
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    /// CPU-side preprocessing. Safe to run outside the device gate.
    pub fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        preprocess(image, CLIP_IMAGE_SIZE)
    }

    /// Embed a preprocessed image tensor.
    pub fn embed_image(&self, tensor: &Array4<f32>) -> Result<Vec<f32>, PipelineError> {
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = tensor.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data)).map_err(|e| {
            PipelineError::inference(MODEL, format!("Failed to create input tensor: {e}"))
        })?;

        let inputs = ort::inputs![self.vision_input.as_str() => input_value];

        let mut session = self
            .vision
            .lock()
            .map_err(|e| PipelineError::inference(MODEL, format!("Session lock poisoned: {e}")))?;

        let outputs = session.run(inputs).map_err(|e| {
            PipelineError::inference(MODEL, format!("Vision inference failed: {e}"))
        })?;

        let values: Vec<_> = outputs.iter().collect();
        let idx = output_index(values.iter().map(|(n, _)| *n), "image_embeds")
            .ok_or_else(|| PipelineError::inference(MODEL, "Model produced no outputs"))?;
        let (name, value) = &values[idx];
        let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
            PipelineError::inference(MODEL, format!("Failed to extract {name}: {e}"))
        })?;
        embedding_row(name, &shape[..], data)
    }

    /// Embed a text string into the shared space.
    pub fn encode_text(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidInput {
                message: "Cannot embed empty text".to_string(),
            });
        }

        let encoding = self.tokenizer.encode(text, true).map_err(|e| {
            PipelineError::inference(MODEL, format!("Tokenization failed: {e}"))
        })?;
        let ids = clip_token_ids(encoding.get_ids());
        let shape = vec![1i64, ids.len() as i64];
        let mask = vec![1i64; ids.len()];

        let ids_value = Value::from_array((shape.clone(), ids)).map_err(|e| {
            PipelineError::inference(MODEL, format!("Failed to create input_ids tensor: {e}"))
        })?;

        let mut session = self
            .text
            .lock()
            .map_err(|e| PipelineError::inference(MODEL, format!("Session lock poisoned: {e}")))?;

        let run = if self.text_inputs.iter().any(|n| n == "attention_mask") {
            let mask_value = Value::from_array((shape, mask)).map_err(|e| {
                PipelineError::inference(
                    MODEL,
                    format!("Failed to create attention_mask tensor: {e}"),
                )
            })?;
            session.run(ort::inputs!["input_ids" => ids_value, "attention_mask" => mask_value])
        } else {
            session.run(ort::inputs!["input_ids" => ids_value])
        };
        let outputs = run.map_err(|e| {
            PipelineError::inference(MODEL, format!("Text inference failed: {e}"))
        })?;

        let values: Vec<_> = outputs.iter().collect();
        let idx = output_index(values.iter().map(|(n, _)| *n), "text_embeds")
            .ok_or_else(|| PipelineError::inference(MODEL, "Model produced no outputs"))?;
        let (name, value) = &values[idx];
        let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
            PipelineError::inference(MODEL, format!("Failed to extract {name}: {e}"))
        })?;
        embedding_row(name, &shape[..], data)
    }
}

/// Truncate to the context length, keeping the end-of-text token last.
///
/// The text tower pools at the end-of-text position, so a plain cut would
/// pool on an arbitrary token.
fn clip_token_ids(ids: &[u32]) -> Vec<i64> {
    if ids.len() <= MAX_TOKENS {
        return ids.iter().map(|&id| id as i64).collect();
    }
    let mut truncated: Vec<i64> = ids[..MAX_TOKENS - 1].iter().map(|&id| id as i64).collect();
    if let Some(&eot) = ids.last() {
        truncated.push(eot as i64);
    }
    truncated
}

/// Index of the preferred output, or the first output when absent.
fn output_index<'a>(names: impl Iterator<Item = &'a str>, preferred: &str) -> Option<usize> {
    let names: Vec<&str> = names.collect();
    names
        .iter()
        .position(|n| *n == preferred)
        .or_else(|| (!names.is_empty()).then_some(0))
}

/// First batch row of an embedding output, L2-normalized.
fn embedding_row(name: &str, shape: &[i64], data: &[f32]) -> Result<Vec<f32>, PipelineError> {
    let dim = match shape.len() {
        1 => data.len(),
        2 => shape[1] as usize,
        _ => {
            return Err(PipelineError::inference(
                MODEL,
                format!("Unexpected {name} shape: {:?}", shape),
            ));
        }
    };

    let mut row = data
        .get(..dim)
        .map(<[f32]>::to_vec)
        .ok_or_else(|| PipelineError::inference(MODEL, format!("Truncated {name} tensor")))?;
    crate::math::l2_normalize_in_place(&mut row);
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_sequences_pass_through() {
        assert_eq!(clip_token_ids(&[49406, 320, 49407]), vec![49406, 320, 49407]);
    }

    #[test]
    fn test_long_sequences_keep_end_token() {
        let mut ids: Vec<u32> = vec![49406];
        ids.extend(std::iter::repeat(320).take(100));
        ids.push(49407);

        let truncated = clip_token_ids(&ids);
        assert_eq!(truncated.len(), MAX_TOKENS);
        assert_eq!(truncated[0], 49406);
        assert_eq!(*truncated.last().unwrap(), 49407);
    }

    #[test]
    fn test_output_index_prefers_named_output() {
        let names = ["last_hidden_state", "text_embeds"];
        assert_eq!(output_index(names.iter().copied(), "text_embeds"), Some(1));
        assert_eq!(output_index(names.iter().copied(), "image_embeds"), Some(0));
        assert_eq!(output_index(std::iter::empty(), "text_embeds"), None);
    }

    #[test]
    fn test_embedding_row_normalizes_first_row() {
        let row = embedding_row("text_embeds", &[2, 2], &[3.0, 4.0, 9.0, 9.0]).unwrap();
        assert!((row[0] - 0.6).abs() < 1e-6);
        assert!((row[1] - 0.8).abs() < 1e-6);
        assert!(embedding_row("x", &[1, 2, 3], &[0.0; 6]).is_err());
    }
}

//! ONNX session wrapper for the multi-label image tagger.

use std::path::Path;
use std::sync::Mutex;

use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

use crate::device::{build_session, DeviceKind};
use crate::error::PipelineError;
use crate::models::ModelKind;
use crate::types::TagMap;

use super::postprocess::{logits_output_index, postprocess, TagOptions};
use super::preprocess::preprocess;
use super::table::TagTable;

const MODEL: ModelKind = ModelKind::ImageTagger;

/// A loaded tagger: session plus the class lookup table.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct ImageTagger {
    session: Mutex<Session>,
    input_name: String,
    table: TagTable,
    device: DeviceKind,
}

impl ImageTagger {
    /// Load the ONNX graph and its metadata sidecar.
    pub fn load(
        model_path: &Path,
        metadata_path: &Path,
        device: DeviceKind,
    ) -> Result<Self, PipelineError> {
        let table =
            TagTable::load(metadata_path).map_err(|e| PipelineError::model_load(MODEL, e))?;

        let session = build_session(MODEL, model_path, device)?;
        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "input".to_string());

        tracing::info!(
            "Image tagger ready: {} classes, {}px input, {}",
            table.len(),
            table.image_size(),
            device
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            table,
            device,
        })
    }

    pub fn table(&self) -> &TagTable {
        &self.table
    }

    /// Square input size the model expects.
    pub fn image_size(&self) -> u32 {
        self.table.image_size()
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    /// CPU-side preprocessing. Safe to run outside the device gate.
    pub fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        preprocess(image, self.image_size())
    }

    /// Run the session and return the first batch row of logits.
    pub fn infer(&self, tensor: &Array4<f32>) -> Result<Vec<f32>, PipelineError> {
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = tensor.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data)).map_err(|e| {
            PipelineError::inference(MODEL, format!("Failed to create input tensor: {e}"))
        })?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::inference(MODEL, format!("Session lock poisoned: {e}")))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| PipelineError::inference(MODEL, format!("ONNX inference failed: {e}")))?;

        let values: Vec<_> = outputs.iter().collect();
        let idx = logits_output_index(values.len())
            .ok_or_else(|| PipelineError::inference(MODEL, "Model produced no outputs"))?;
        let (name, value) = &values[idx];

        let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
            PipelineError::inference(MODEL, format!("Failed to extract {name} tensor: {e}"))
        })?;

        let row_len = match shape.len() {
            1 => data.len(),
            2 => shape[1] as usize,
            _ => {
                return Err(PipelineError::inference(
                    MODEL,
                    format!("Unexpected {name} shape: {:?}", shape),
                ));
            }
        };

        data.get(..row_len).map(<[f32]>::to_vec).ok_or_else(|| {
            PipelineError::inference(MODEL, format!("Truncated {name} tensor: {:?}", shape))
        })
    }

    /// Check logits against the table, then group them into tags.
    pub fn postprocess(
        &self,
        logits: &[f32],
        options: &TagOptions,
    ) -> Result<TagMap, PipelineError> {
        check_logits(logits, &self.table)?;
        Ok(postprocess(logits, &self.table, options))
    }

    /// Preprocess, infer and postprocess synchronously.
    pub fn tag(
        &self,
        image: &DynamicImage,
        options: &TagOptions,
    ) -> Result<TagMap, PipelineError> {
        validate_request(image, options)?;
        let tensor = self.preprocess(image);
        let logits = self.infer(&tensor)?;
        self.postprocess(&logits, options)
    }
}

/// Reject requests that cannot produce a meaningful result.
pub fn validate_request(image: &DynamicImage, options: &TagOptions) -> Result<(), PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::InvalidInput {
            message: format!("Image has zero size ({}x{})", image.width(), image.height()),
        });
    }
    if !(0.0..=1.0).contains(&options.threshold) {
        return Err(PipelineError::InvalidInput {
            message: format!("Threshold {} outside [0, 1]", options.threshold),
        });
    }
    // Either cap at zero would let a request come back with no tags
    if options.max_per_category == 0 {
        return Err(PipelineError::InvalidInput {
            message: "max_per_category must be at least 1".into(),
        });
    }
    if options.min_results == 0 {
        return Err(PipelineError::InvalidInput {
            message: "min_results must be at least 1".into(),
        });
    }
    Ok(())
}

/// Logits must cover the table exactly and be finite.
fn check_logits(logits: &[f32], table: &TagTable) -> Result<(), PipelineError> {
    if logits.len() != table.len() {
        return Err(PipelineError::inference(
            MODEL,
            format!(
                "Model emitted {} logits but metadata lists {} tags",
                logits.len(),
                table.len()
            ),
        ));
    }
    if let Some(pos) = logits.iter().position(|x| !x.is_finite()) {
        return Err(PipelineError::inference(
            MODEL,
            format!("Non-finite logit at class {pos}"),
        ));
    }
    Ok(())
}

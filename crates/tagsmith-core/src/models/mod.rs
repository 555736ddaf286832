//! Model lifecycle: lazy fetch, one-time load, shared access.
//!
//! Each model sits in its own [`LazyModel`] slot. The first caller fetches
//! artifacts and builds the session; concurrent callers wait on that same load
//! and then share the result. A failed load leaves the slot empty, so the next
//! access tries again instead of replaying a cached error.
//!
//! Device-bound inference (tagger, dual encoder) runs through the
//! [`DeviceGate`]; preprocessing and the CPU text embedder do not.

pub mod encoders;
pub mod gate;
pub mod hub;
pub mod lazy;

use std::fmt;
use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;

use crate::config::Config;
use crate::device::{select_device, DeviceKind};
use crate::embedding::{DualEncoder, DualEncoderFiles, TextEmbedder};
use crate::error::PipelineError;
use crate::tagging::{validate_request, ImageTagger, TagOptions};
use crate::types::TagMap;

pub use encoders::{QueryTextEncoder, TagTextEncoder};
pub use gate::DeviceGate;
pub use hub::{Artifact, ArtifactCheck, ModelFetcher};
pub use lazy::LazyModel;

/// The three models the library can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Multi-label image tagger
    ImageTagger,
    /// CLIP image/text encoder
    DualEncoder,
    /// MiniLM sentence embedder for tag similarity
    TextEmbedder,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::ImageTagger,
        ModelKind::DualEncoder,
        ModelKind::TextEmbedder,
    ];

    /// Remote files this model is built from.
    pub fn artifacts(self) -> &'static [Artifact] {
        match self {
            ModelKind::ImageTagger => &[TAGGER_MODEL, TAGGER_METADATA],
            ModelKind::DualEncoder => &[CLIP_VISION, CLIP_TEXT, CLIP_TOKENIZER],
            ModelKind::TextEmbedder => &[MINILM_MODEL, MINILM_TOKENIZER],
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::ImageTagger => f.write_str("image tagger"),
            ModelKind::DualEncoder => f.write_str("dual encoder"),
            ModelKind::TextEmbedder => f.write_str("text embedder"),
        }
    }
}

const TAGGER_REPO: &str = "Camais03/camie-tagger-v2";
const CLIP_REPO: &str = "Xenova/clip-vit-base-patch32";
const MINILM_REPO: &str = "Xenova/all-MiniLM-L6-v2";

const TAGGER_MODEL: Artifact = Artifact {
    repo: TAGGER_REPO,
    remote_path: "camie-tagger-v2.onnx",
};
const TAGGER_METADATA: Artifact = Artifact {
    repo: TAGGER_REPO,
    remote_path: "camie-tagger-v2-metadata.json",
};
const CLIP_VISION: Artifact = Artifact {
    repo: CLIP_REPO,
    remote_path: "onnx/vision_model.onnx",
};
const CLIP_TEXT: Artifact = Artifact {
    repo: CLIP_REPO,
    remote_path: "onnx/text_model.onnx",
};
const CLIP_TOKENIZER: Artifact = Artifact {
    repo: CLIP_REPO,
    remote_path: "tokenizer.json",
};
const MINILM_MODEL: Artifact = Artifact {
    repo: MINILM_REPO,
    remote_path: "onnx/model.onnx",
};
const MINILM_TOKENIZER: Artifact = Artifact {
    repo: MINILM_REPO,
    remote_path: "tokenizer.json",
};

/// Snapshot of one model's state, for `models status`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub model: ModelKind,
    pub loaded: bool,
    pub artifacts_present: bool,
    pub device: DeviceKind,
}

/// Owns every model and the gate in front of the accelerator.
pub struct ModelManager {
    fetcher: Arc<ModelFetcher>,
    device: DeviceKind,
    gate: DeviceGate,
    tagger: LazyModel<ImageTagger>,
    dual: LazyModel<DualEncoder>,
    text: LazyModel<TextEmbedder>,
}

impl ModelManager {
    /// Pick the device and prepare empty model slots. Nothing is loaded yet.
    pub fn new(config: &Config) -> Self {
        let device = select_device(config.general.device);
        tracing::info!("Inference device: {}", device);

        Self {
            fetcher: Arc::new(ModelFetcher::new(config)),
            device,
            gate: DeviceGate::new(),
            tagger: LazyModel::new(ModelKind::ImageTagger),
            dual: LazyModel::new(ModelKind::DualEncoder),
            text: LazyModel::new(ModelKind::TextEmbedder),
        }
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    pub fn gate(&self) -> &DeviceGate {
        &self.gate
    }

    pub fn fetcher(&self) -> &ModelFetcher {
        &self.fetcher
    }

    /// Device a given model runs on; the text embedder is always CPU.
    pub fn device_for(&self, model: ModelKind) -> DeviceKind {
        match model {
            ModelKind::TextEmbedder => DeviceKind::Cpu,
            _ => self.device,
        }
    }

    pub fn is_loaded(&self, model: ModelKind) -> bool {
        match model {
            ModelKind::ImageTagger => self.tagger.is_loaded(),
            ModelKind::DualEncoder => self.dual.is_loaded(),
            ModelKind::TextEmbedder => self.text.is_loaded(),
        }
    }

    pub fn status(&self) -> Vec<ModelStatus> {
        ModelKind::ALL
            .iter()
            .map(|&model| ModelStatus {
                model,
                loaded: self.is_loaded(model),
                artifacts_present: model
                    .artifacts()
                    .iter()
                    .all(|a| self.fetcher.is_present(a)),
                device: self.device_for(model),
            })
            .collect()
    }

    pub async fn image_tagger(&self) -> Result<Arc<ImageTagger>, PipelineError> {
        let model = ModelKind::ImageTagger;
        let fetcher = Arc::clone(&self.fetcher);
        let device = self.device;
        self.tagger
            .get_or_load(move || async move {
                let onnx = fetcher.ensure(model, &TAGGER_MODEL).await?;
                let metadata = fetcher.ensure(model, &TAGGER_METADATA).await?;
                build_blocking(model, move || ImageTagger::load(&onnx, &metadata, device)).await
            })
            .await
    }

    pub async fn dual_encoder(&self) -> Result<Arc<DualEncoder>, PipelineError> {
        let model = ModelKind::DualEncoder;
        let fetcher = Arc::clone(&self.fetcher);
        let device = self.device;
        self.dual
            .get_or_load(move || async move {
                let vision = fetcher.ensure(model, &CLIP_VISION).await?;
                let text = fetcher.ensure(model, &CLIP_TEXT).await?;
                let tokenizer = fetcher.ensure(model, &CLIP_TOKENIZER).await?;
                build_blocking(model, move || {
                    DualEncoder::load(
                        DualEncoderFiles {
                            vision_model: &vision,
                            text_model: &text,
                            tokenizer: &tokenizer,
                        },
                        device,
                    )
                })
                .await
            })
            .await
    }

    pub async fn text_embedder(&self) -> Result<Arc<TextEmbedder>, PipelineError> {
        let model = ModelKind::TextEmbedder;
        let fetcher = Arc::clone(&self.fetcher);
        self.text
            .get_or_load(move || async move {
                let onnx = fetcher.ensure(model, &MINILM_MODEL).await?;
                let tokenizer = fetcher.ensure(model, &MINILM_TOKENIZER).await?;
                build_blocking(model, move || TextEmbedder::load(&onnx, &tokenizer)).await
            })
            .await
    }

    /// Load one model now instead of on first use.
    pub async fn preload(&self, model: ModelKind) -> Result<(), PipelineError> {
        match model {
            ModelKind::ImageTagger => self.image_tagger().await.map(|_| ()),
            ModelKind::DualEncoder => self.dual_encoder().await.map(|_| ()),
            ModelKind::TextEmbedder => self.text_embedder().await.map(|_| ()),
        }
    }

    /// Load all models concurrently, returning the first failure.
    pub async fn preload_all(&self) -> Result<(), PipelineError> {
        let (tagger, dual, text) = tokio::join!(
            self.image_tagger(),
            self.dual_encoder(),
            self.text_embedder()
        );
        tagger?;
        dual?;
        text?;
        Ok(())
    }

    /// Tag an image: validate, preprocess off-gate, infer under the gate.
    pub async fn tag_image(
        &self,
        image: DynamicImage,
        options: TagOptions,
    ) -> Result<TagMap, PipelineError> {
        let model = ModelKind::ImageTagger;
        validate_request(&image, &options)?;
        let tagger = self.image_tagger().await?;

        let prep = Arc::clone(&tagger);
        let tensor = tokio::task::spawn_blocking(move || prep.preprocess(&image))
            .await
            .map_err(|e| PipelineError::inference(model, format!("Preprocessing failed: {e}")))?;

        let infer = Arc::clone(&tagger);
        let logits = self.gate.run(model, move || infer.infer(&tensor)).await?;

        tagger.postprocess(&logits, &options)
    }

    /// Embed an image into the dual-encoder space.
    pub async fn embed_image(&self, image: DynamicImage) -> Result<Vec<f32>, PipelineError> {
        let model = ModelKind::DualEncoder;
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::InvalidInput {
                message: format!("Image has zero size ({}x{})", image.width(), image.height()),
            });
        }
        let encoder = self.dual_encoder().await?;

        let prep = Arc::clone(&encoder);
        let tensor = tokio::task::spawn_blocking(move || prep.preprocess(&image))
            .await
            .map_err(|e| PipelineError::inference(model, format!("Preprocessing failed: {e}")))?;

        self.gate
            .run(model, move || encoder.embed_image(&tensor))
            .await
    }

    /// Embed text into the dual-encoder space (comparable with image vectors).
    pub async fn encode_query_text(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let encoder = self.dual_encoder().await?;
        let text = text.to_string();
        self.gate
            .run(ModelKind::DualEncoder, move || encoder.encode_text(&text))
            .await
    }

    /// Embed tag strings with the sentence embedder.
    pub async fn embed_tags(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, PipelineError> {
        let model = ModelKind::TextEmbedder;
        let embedder = self.text_embedder().await?;
        tokio::task::spawn_blocking(move || embedder.encode_batch(&texts))
            .await
            .map_err(|e| PipelineError::inference(model, format!("Embedding task failed: {e}")))?
    }
}

/// Build a model session on the blocking pool.
async fn build_blocking<T, F>(model: ModelKind, f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::model_load(model, format!("Load task failed: {e}")))?
}

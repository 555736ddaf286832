//! Tagsmith Core - image auto-tagging and semantic tag resolution.
//!
//! Tagsmith sits behind a media search index and does two jobs:
//!
//! - **Tagging**: an image goes in, category-grouped tags with confidences
//!   come out, plus a dense vector for similarity search.
//! - **Resolution**: a natural-language query goes in, canonical positive and
//!   negative tags come out, plus a dense vector for whatever tags cannot say.
//!
//! # Architecture
//!
//! ```text
//! object id → ImageSource → ModelManager ─┬─ image tagger  → TagMap
//!                                          └─ dual encoder  → image vector
//!
//! query → LLM decomposition → TagMatcher (text embedder + VectorStore) → ResolvedTags
//!                           └ residual text → dual encoder → query vector
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tagsmith_core::{Config, Tagsmith, TagOptions};
//!
//! #[tokio::main]
//! async fn main() -> tagsmith_core::Result<()> {
//!     let config = Config::load()?;
//!     let tagsmith = Tagsmith::new(config).await?;
//!
//!     let tags = tagsmith.tag_object("album/cat.jpg", TagOptions::default()).await?;
//!     println!("Tags: {:?}", tags);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod device;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod matching;
pub mod math;
pub mod models;
pub mod resolve;
pub mod source;
pub mod tagging;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

// Re-exports for convenient access
pub use config::Config;
pub use device::{DeviceKind, DevicePreference};
pub use error::{ConfigError, PipelineError, PipelineResult, Result, TagsmithError};
pub use llm::LlmTarget;
pub use matching::{RebuildReport, SqliteVectorStore, TagMatcher, TextEncoder, VectorStore};
pub use models::{ModelKind, ModelManager, ModelStatus};
pub use resolve::QueryResolver;
pub use source::{FsImageSource, ImageSource};
pub use tagging::TagOptions;
pub use types::{CategorizedTag, ResolvedTags, ScoredTag, SemanticResolution, TagMap, TagMatch};

use matching::rebuild_vocabulary;
use models::{QueryTextEncoder, TagTextEncoder};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tagsmith service - the main entry point.
///
/// Owns the model manager, the vector store, the image source and the query
/// resolver. Models load lazily on first use unless [`Tagsmith::preload`] is
/// called.
pub struct Tagsmith {
    config: Config,
    models: Arc<ModelManager>,
    store: Arc<SqliteVectorStore>,
    source: Arc<dyn ImageSource>,
    resolver: QueryResolver,
}

impl Tagsmith {
    /// Wire up every component from configuration. No model is loaded yet.
    pub async fn new(config: Config) -> Result<Self> {
        tracing::debug!("Initializing Tagsmith v{}", VERSION);

        let models = Arc::new(ModelManager::new(&config));
        let store = Arc::new(SqliteVectorStore::open(&config.store_path())?);
        let source: Arc<dyn ImageSource> = Arc::new(FsImageSource::new(
            config.images_root(),
            config.limits.clone(),
        ));

        let matcher = TagMatcher::new(
            Arc::new(TagTextEncoder::new(Arc::clone(&models))),
            Arc::clone(&store) as Arc<dyn VectorStore>,
        );
        let resolver = QueryResolver::new(
            matcher,
            Arc::new(QueryTextEncoder::new(Arc::clone(&models))),
            config.llm.clone(),
        )
        .with_match_threshold(config.matching.threshold);

        Ok(Self {
            config,
            models,
            store,
            source,
            resolver,
        })
    }

    /// Create a new instance with configuration from the default location.
    pub async fn with_defaults() -> Result<Self> {
        let config = Config::load()?;
        Self::new(config).await
    }

    /// Replace the image source.
    pub fn with_source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.source = source;
        self
    }

    /// Resolve queries without embedding the residual description.
    pub fn without_residual_embedding(mut self) -> Self {
        self.resolver = self.resolver.with_residual_embedding(false);
        self
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn models(&self) -> &Arc<ModelManager> {
        &self.models
    }

    pub fn store(&self) -> &Arc<SqliteVectorStore> {
        &self.store
    }

    pub fn resolver(&self) -> &QueryResolver {
        &self.resolver
    }

    /// Default tagging options from the `[tagging]` section.
    pub fn tag_options(&self) -> TagOptions {
        TagOptions::from(&self.config.tagging)
    }

    /// Fetch an image and tag it.
    pub async fn tag_object(&self, object: &str, options: TagOptions) -> PipelineResult<TagMap> {
        let image = self.source.fetch(object).await?;
        self.models.tag_image(image, options).await
    }

    /// Fetch an image and return a flat `tag -> confidence` map.
    pub async fn tag_scores(
        &self,
        object: &str,
        threshold: f32,
    ) -> PipelineResult<BTreeMap<String, f32>> {
        let options = TagOptions {
            threshold,
            ..self.tag_options()
        };
        let tags = self.tag_object(object, options).await?;
        Ok(types::flatten_tag_map(&tags))
    }

    /// Fetch an image and embed it with the dual encoder.
    pub async fn embed_object(&self, object: &str) -> PipelineResult<Vec<f32>> {
        let image = self.source.fetch(object).await?;
        self.models.embed_image(image).await
    }

    /// Match one free-text candidate against the vocabulary.
    pub async fn match_tag(
        &self,
        candidate: &str,
        threshold: f32,
    ) -> PipelineResult<Option<TagMatch>> {
        self.resolver.matcher().match_tag(candidate, threshold).await
    }

    /// Resolve a natural-language query into canonical tags.
    pub async fn resolve(
        &self,
        query: &str,
        target: &LlmTarget,
    ) -> PipelineResult<SemanticResolution> {
        self.resolver.resolve(query, target).await
    }

    /// Embed a whole query with the dual encoder; `None` for empty text.
    pub async fn embed_query(&self, text: &str) -> PipelineResult<Option<Vec<f32>>> {
        self.resolver.embed_query(text).await
    }

    /// Register canonical tag names (without vectors).
    pub async fn import_tags(&self, names: Vec<String>) -> PipelineResult<usize> {
        self.store.insert_tags(names).await
    }

    /// Re-embed every canonical tag.
    pub async fn rebuild_vocabulary(&self) -> PipelineResult<RebuildReport> {
        let encoder = TagTextEncoder::new(Arc::clone(&self.models));
        rebuild_vocabulary(
            &encoder,
            self.store.as_ref(),
            self.config.matching.rebuild_batch_size,
        )
        .await
    }

    /// Load every model now. Any failure is returned.
    pub async fn preload(&self) -> PipelineResult<()> {
        self.models.preload_all().await
    }

    pub fn model_status(&self) -> Vec<ModelStatus> {
        self.models.status()
    }
}

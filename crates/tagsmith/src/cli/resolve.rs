//! The `tagsmith resolve` command.

use clap::Args;
use tagsmith_core::llm::resolve_env_var;
use tagsmith_core::{Config, LlmTarget, Tagsmith};

/// Arguments for the `resolve` command.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Natural-language search query
    pub query: String,

    /// OpenAI-compatible endpoint (default from config)
    #[arg(long)]
    pub llm_endpoint: Option<String>,

    /// Model name passed to the endpoint (default from config)
    #[arg(long)]
    pub llm_model: Option<String>,

    /// Bearer credential; `${VAR}` is read from the environment
    #[arg(long, env = "TAGSMITH_LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Minimum similarity for a candidate tag (default from config)
    #[arg(long)]
    pub match_threshold: Option<f32>,

    /// Skip embedding the residual description
    #[arg(long)]
    pub no_embedding: bool,
}

/// Execute the resolve command.
pub async fn execute(args: ResolveArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(threshold) = args.match_threshold {
        anyhow::ensure!(
            (0.0..=1.0).contains(&threshold),
            "--match-threshold must be between 0.0 and 1.0, got {threshold}"
        );
        config.matching.threshold = threshold;
    }

    let target = build_target(&config, &args);
    tracing::debug!("Decomposing with {} at {}", target.model, target.endpoint);

    let mut tagsmith = Tagsmith::new(config).await?;
    if args.no_embedding {
        tagsmith = tagsmith.without_residual_embedding();
    }

    let resolution = tagsmith.resolve(&args.query, &target).await?;
    super::print_json(&resolution)
}

/// Command-line values take precedence over the `[llm]` section.
fn build_target(config: &Config, args: &ResolveArgs) -> LlmTarget {
    let mut target = LlmTarget::from_config(&config.llm);
    if let Some(endpoint) = &args.llm_endpoint {
        target.endpoint = endpoint.clone();
    }
    if let Some(model) = &args.llm_model {
        target.model = model.clone();
    }
    if let Some(key) = &args.api_key {
        target.api_key = resolve_env_var(key);
    }
    target
}

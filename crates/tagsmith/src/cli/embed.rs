//! The `tagsmith embed` command.

use clap::Args;
use serde::Serialize;
use tagsmith_core::{Config, Tagsmith};

/// Arguments for the `embed` command.
#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Object identifier, relative to the configured images root
    pub object: String,
}

#[derive(Serialize)]
struct EmbedOutput<'a> {
    object: &'a str,
    dimensions: usize,
    embedding: Vec<f32>,
}

/// Execute the embed command.
pub async fn execute(args: EmbedArgs, config: Config) -> anyhow::Result<()> {
    let tagsmith = Tagsmith::new(config).await?;
    let embedding = tagsmith.embed_object(&args.object).await?;

    super::print_json(&EmbedOutput {
        object: &args.object,
        dimensions: embedding.len(),
        embedding,
    })
}

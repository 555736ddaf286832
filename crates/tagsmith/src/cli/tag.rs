//! The `tagsmith tag` command.

use clap::Args;
use tagsmith_core::{Config, Tagsmith};

/// Arguments for the `tag` command.
#[derive(Args, Debug)]
pub struct TagArgs {
    /// Object identifier, relative to the configured images root
    pub object: String,

    /// Minimum probability for a tag (default from config)
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Maximum tags per category (default from config)
    #[arg(long)]
    pub max_per_category: Option<usize>,

    /// Print one list of tags, highest confidence first, instead of categories
    #[arg(long)]
    pub flat: bool,
}

/// Execute the tag command.
pub async fn execute(args: TagArgs, config: Config) -> anyhow::Result<()> {
    let tagsmith = Tagsmith::new(config).await?;

    let mut options = tagsmith.tag_options();
    if let Some(threshold) = args.threshold {
        options.threshold = threshold;
    }
    if let Some(max) = args.max_per_category {
        options.max_per_category = max;
    }

    let tags = tagsmith.tag_object(&args.object, options).await?;
    if args.flat {
        super::print_json(&tagsmith_core::types::categorized_tags(&tags))
    } else {
        super::print_json(&tags)
    }
}

//! The `tagsmith vocab` command for the canonical tag vocabulary.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use serde::Serialize;
use tagsmith_core::{Config, Tagsmith};

/// Arguments for the `vocab` command.
#[derive(Args, Debug)]
pub struct VocabArgs {
    #[command(subcommand)]
    pub command: VocabCommand,
}

/// Subcommands for vocabulary management.
#[derive(Subcommand, Debug)]
pub enum VocabCommand {
    /// Register canonical tags from a file, one per line
    Import {
        /// Tag list (`#` starts a comment line)
        file: String,

        /// Re-embed the vocabulary after importing
        #[arg(long)]
        rebuild: bool,
    },

    /// Re-embed every canonical tag
    Rebuild,

    /// Show vocabulary counts
    Stats,
}

#[derive(Serialize)]
struct VocabStats {
    store: PathBuf,
    tags: usize,
    vectorized: usize,
}

#[derive(Serialize)]
struct ImportOutput {
    read: usize,
    inserted: usize,
}

/// Execute the vocab command.
pub async fn execute(args: VocabArgs, config: Config) -> anyhow::Result<()> {
    let store_path = config.store_path();
    let tagsmith = Tagsmith::new(config).await?;

    match args.command {
        VocabCommand::Import { file, rebuild } => {
            let path = PathBuf::from(shellexpand::tilde(&file).as_ref());
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read tag list {}", path.display()))?;
            let names = parse_tag_list(&text);
            let read = names.len();
            let inserted = tagsmith.import_tags(names).await?;
            tracing::info!("Imported {} new tags ({} read)", inserted, read);
            super::print_json(&ImportOutput { read, inserted })?;

            if rebuild {
                let report = tagsmith.rebuild_vocabulary().await?;
                super::print_json(&report)?;
            }
        }

        VocabCommand::Rebuild => {
            let report = tagsmith.rebuild_vocabulary().await?;
            super::print_json(&report)?;
        }

        VocabCommand::Stats => {
            let store = tagsmith.store();
            super::print_json(&VocabStats {
                store: store_path,
                tags: store.tag_count().await?,
                vectorized: store.vectorized_count().await?,
            })?;
        }
    }

    Ok(())
}

/// One tag per line; blank lines and `#` comments are ignored.
fn parse_tag_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_list() {
        let text = "# danbooru general\ncat_ears\n\n  long_hair  \n#skip\nsaber_(fate)\n";
        assert_eq!(
            parse_tag_list(text),
            vec!["cat_ears", "long_hair", "saber_(fate)"]
        );
    }
}

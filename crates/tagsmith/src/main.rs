//! Tagsmith CLI - image auto-tagging and semantic tag resolution.
//!
//! Results are printed as JSON on stdout; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Tag an image under the configured images root
//! tagsmith tag album/cat.jpg --threshold 0.5
//!
//! # Turn a query into canonical tags
//! tagsmith resolve "girl in a red dress, no glasses, film look"
//!
//! # Manage the canonical vocabulary
//! tagsmith vocab import tags.txt
//! tagsmith vocab rebuild
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Tagsmith - image auto-tagging and semantic tag resolution.
#[derive(Parser, Debug)]
#[command(name = "tagsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Tag an image
    Tag(cli::tag::TagArgs),

    /// Embed an image with the dual encoder
    Embed(cli::embed::EmbedArgs),

    /// Resolve a natural-language query into canonical tags
    Resolve(cli::resolve::ResolveArgs),

    /// Manage the canonical tag vocabulary
    Vocab(cli::vocab::VocabArgs),

    /// Manage models (preload, download, verify, status, path)
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match tagsmith_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `tagsmith config path`."
            );
            tagsmith_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Tagsmith v{}", tagsmith_core::VERSION);

    match cli.command {
        Commands::Tag(args) => cli::tag::execute(args, config).await,
        Commands::Embed(args) => cli::embed::execute(args, config).await,
        Commands::Resolve(args) => cli::resolve::execute(args, config).await,
        Commands::Vocab(args) => cli::vocab::execute(args, config).await,
        Commands::Models(args) => cli::models::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}

//! The `tagsmith models` command.

use clap::{Args, Subcommand};
use serde::Serialize;
use tagsmith_core::models::ArtifactCheck;
use tagsmith_core::{Config, DeviceKind, ModelKind, ModelManager, ModelStatus};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download and load every model now; fails on the first error
    Preload,

    /// Download model files without loading them
    Download,

    /// Re-hash downloaded model files against their recorded checksums
    Verify,

    /// Show device and readiness of each model
    Status,

    /// Show model directory path
    Path,
}

#[derive(Serialize)]
struct VerifyOutput {
    model: ModelKind,
    artifact: &'static str,
    #[serde(flatten)]
    check: ArtifactCheck,
}

#[derive(Serialize)]
struct StatusOutput {
    device: DeviceKind,
    models: Vec<ModelStatus>,
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config: Config) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::Path => {
            println!("{}", config.model_dir().display());
        }

        ModelsCommand::Status => {
            let manager = ModelManager::new(&config);
            super::print_json(&StatusOutput {
                device: manager.device(),
                models: manager.status(),
            })?;
        }

        ModelsCommand::Download => {
            let manager = ModelManager::new(&config);
            for model in ModelKind::ALL {
                for artifact in model.artifacts() {
                    let path = manager.fetcher().ensure(model, artifact).await?;
                    tracing::info!("{}: {}", model, path.display());
                }
            }
            println!("Models ready in {}", config.model_dir().display());
        }

        ModelsCommand::Verify => {
            let manager = ModelManager::new(&config);
            let mut results = Vec::new();
            for model in ModelKind::ALL {
                for artifact in model.artifacts() {
                    let check = manager.fetcher().verify(model, artifact).await?;
                    results.push(VerifyOutput {
                        model,
                        artifact: artifact.remote_path,
                        check,
                    });
                }
            }
            super::print_json(&results)?;

            let corrupt = results
                .iter()
                .filter(|r| matches!(r.check, ArtifactCheck::Corrupt { .. }))
                .count();
            if corrupt > 0 {
                anyhow::bail!(
                    "{corrupt} model file(s) failed verification and were removed; \
                     run `tagsmith models download` to fetch them again"
                );
            }
        }

        ModelsCommand::Preload => {
            let manager = ModelManager::new(&config);
            manager.preload_all().await?;
            super::print_json(&StatusOutput {
                device: manager.device(),
                models: manager.status(),
            })?;
        }
    }

    Ok(())
}

//! bnews-scoring - Composite bias scoring command-line entry point
//!
//! Runs single scoring operations against the configured database and model
//! endpoints. Progress of a reanalysis is printed as JSON lines until the job
//! reaches a terminal step.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bnews_common::config::{load_bootstrap_config, write_toml_config, TomlConfig};
use bnews_common::logging::init_tracing;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::info;

use bnews_scoring::ScoringRuntime;

/// Command-line arguments for bnews-scoring
#[derive(Parser, Debug)]
#[command(name = "bnews-scoring")]
#[command(about = "Composite bias scoring for bnews documents")]
#[command(version)]
struct Args {
    /// Bootstrap TOML config file
    #[arg(short, long, env = "BNEWS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the first configured model that answers a trial call
    HealthCheck,

    /// Rescore a document with the full model ensemble
    Reanalyze {
        document_id: i64,

        /// File holding the document text
        #[arg(long)]
        content_file: PathBuf,
    },

    /// Recalculate the composite from stored raw scores
    Update { document_id: i64 },

    /// Set a composite score by hand
    Manual {
        document_id: i64,

        #[arg(allow_hyphen_values = true)]
        score: f64,
    },

    /// Print the stored composite score
    Show { document_id: i64 },

    /// Write a bootstrap config with default values
    InitConfig { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::InitConfig { path } = &args.command {
        write_toml_config(&TomlConfig::default(), path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = load_bootstrap_config(args.config.as_deref())
        .context("Failed to load bootstrap config")?;
    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!("Starting bnews-scoring v{}", env!("CARGO_PKG_VERSION"));

    let runtime = ScoringRuntime::build(&config)
        .await
        .context("Failed to initialize scoring runtime")?;

    let outcome = run(&runtime, args.command).await;
    runtime.shutdown().await;
    outcome
}

async fn run(runtime: &ScoringRuntime, command: Command) -> Result<()> {
    match command {
        Command::HealthCheck => {
            let model = runtime
                .reanalyzer
                .health_check()
                .await
                .context("Health check failed")?;
            println!("{}", model);
        }
        Command::Reanalyze {
            document_id,
            content_file,
        } => {
            let content = tokio::fs::read_to_string(&content_file)
                .await
                .with_context(|| format!("Failed to read {}", content_file.display()))?;

            let (ticket, handle) = runtime
                .reanalyzer
                .reanalyze(document_id, content)
                .await
                .context("Reanalysis was not queued")?;
            println!("{}", serde_json::to_string(&ticket)?);

            let mut updates = Box::pin(runtime.progress.stream(document_id));
            while let Some(state) = updates.next().await {
                println!("{}", serde_json::to_string(&state)?);
            }
            handle
                .await
                .context("Reanalysis task failed")?
                .with_context(|| format!("Reanalysis of document {} failed", document_id))?;
        }
        Command::Update { document_id } => {
            let result = runtime
                .manager
                .update_score(document_id)
                .await
                .with_context(|| format!("Failed to update document {}", document_id))?;
            println!("{}", serde_json::to_string(&result)?);
        }
        Command::Manual { document_id, score } => {
            runtime
                .manager
                .set_manual_score(document_id, score)
                .await
                .with_context(|| format!("Failed to set score for document {}", document_id))?;
            println!("Document {} set to {}", document_id, score);
        }
        Command::Show { document_id } => {
            match runtime.manager.get_composite(document_id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("No composite score for document {}", document_id),
            }
        }
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_config_command_parses() {
        let args = Args::try_parse_from(["bnews-scoring", "init-config", "/tmp/bnews.toml"]).unwrap();
        match args.command {
            Command::InitConfig { path } => assert_eq!(path, PathBuf::from("/tmp/bnews.toml")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_manual_accepts_negative_score() {
        let args = Args::try_parse_from(["bnews-scoring", "manual", "7", "-0.4"]).unwrap();
        match args.command {
            Command::Manual { document_id, score } => {
                assert_eq!(document_id, 7);
                assert_eq!(score, -0.4);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}

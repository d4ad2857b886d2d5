//! CLI for inspecting and syncing the local fallback queue.

mod commands;

use anyhow::Result;
use capsync_core::config;
use capsync_core::FallbackQueue;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_abandon, run_config, run_pending, run_sync};

/// Top-level CLI for capsync.
#[derive(Debug, Parser)]
#[command(name = "capsync")]
#[command(about = "capsync: resilient remote access and offline upload queue", long_about = None)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/capsync/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Fallback queue database (default: $XDG_STATE_HOME/capsync/fallback.db).
    #[arg(long, global = true, value_name = "PATH")]
    pub queue: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List uploads waiting in the local fallback queue.
    Pending {
        /// Include synced and abandoned records.
        #[arg(long)]
        all: bool,
    },

    /// Retry every pending record against the remote store once.
    Sync {
        /// Attempts per remote call (default: upload.chunk_retry_budget from config).
        #[arg(long, value_name = "N")]
        retry_budget: Option<u32>,
    },

    /// Stop retrying a pending record. The record is kept on disk.
    Abandon {
        /// Record identifier (as shown by `pending`).
        id: String,
    },

    /// Show the config file location and effective values.
    Config,
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => config::config_path()?,
        };
        let cfg = config::load_or_init_at(&config_path)?;
        tracing::debug!("loaded config: {:?}", cfg.api_base_url);

        match cli.command {
            CliCommand::Config => run_config(&cfg, &config_path)?,
            CliCommand::Pending { all } => run_pending(&open_queue(&cli.queue).await?, all).await?,
            CliCommand::Sync { retry_budget } => {
                run_sync(&cfg, &open_queue(&cli.queue).await?, retry_budget).await?
            }
            CliCommand::Abandon { id } => run_abandon(&open_queue(&cli.queue).await?, &id).await?,
        }
        Ok(())
    }
}

async fn open_queue(path: &Option<PathBuf>) -> Result<FallbackQueue> {
    Ok(match path {
        Some(path) => FallbackQueue::open_at(path).await?,
        None => FallbackQueue::open_default().await?,
    })
}

#[cfg(test)]
mod tests;

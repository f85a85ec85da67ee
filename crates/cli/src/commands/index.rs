//! Index command handler.
//!
//! The administrative side of a knowledge base: rebuild, status and
//! rollback. Progress and logs go to stderr; results go to stdout.

use anyhow::Context;
use clap::{Args, Subcommand};
use docent_core::config::AppConfig;
use docent_knowledge::{IndexStatus, LockState, ProgressEvent, ProgressReporter, RebuildOutcome};
use std::path::PathBuf;
use std::sync::Arc;

/// Build, inspect and roll back knowledge base indexes
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(subcommand)]
    pub action: IndexAction,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Rebuild the index from the corpus and publish it
    Rebuild(RebuildCommand),
    /// Show the published version, lock state and backups
    Status(StatusCommand),
    /// Republish the previous version
    Rollback(RollbackCommand),
}

impl IndexCommand {
    pub fn name(&self) -> &'static str {
        match self.action {
            IndexAction::Rebuild(_) => "index.rebuild",
            IndexAction::Status(_) => "index.status",
            IndexAction::Rollback(_) => "index.rollback",
        }
    }

    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        match &self.action {
            IndexAction::Rebuild(cmd) => cmd.execute(config).await,
            IndexAction::Status(cmd) => cmd.execute(config),
            IndexAction::Rollback(cmd) => cmd.execute(config),
        }
    }
}

/// Rebuild a knowledge base
#[derive(Args, Debug)]
pub struct RebuildCommand {
    /// Knowledge base name
    pub base: String,

    /// Corpus directory (overrides corpus.root from the base config)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Rebuild even if the corpus is unchanged
    #[arg(long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RebuildCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Rebuilding knowledge base '{}'", self.base);

        let progress = if self.json {
            ProgressReporter::noop()
        } else {
            ProgressReporter::new(Arc::new(|event: ProgressEvent| eprintln!("{}", event.format_simple())))
        };

        let outcome = docent_knowledge::rebuild(
            &config.workspace,
            &self.base,
            self.path.as_deref(),
            self.force,
            &progress,
        )
        .await
        .with_context(|| format!("Rebuild of '{}' failed", self.base))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("Failed to serialize rebuild outcome")?
            );
            return Ok(());
        }

        match outcome {
            RebuildOutcome::Published(stats) => {
                println!("Published {}", stats.version_id);
                println!("  Documents: {}", stats.documents_processed);
                println!("  Chunks: {}", stats.chunks_produced);
                println!("  Duration: {:.2}s", stats.duration_ms as f64 / 1000.0);
            }
            RebuildOutcome::Unchanged { version_id } => {
                println!("Corpus unchanged; {} is still live (use --force to rebuild)", version_id);
            }
        }
        Ok(())
    }
}

/// Show knowledge base status
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Knowledge base name
    pub base: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let status = docent_knowledge::status(&config.workspace, &self.base)?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("Failed to serialize status")?
            );
        } else {
            print_status(&self.base, &status);
        }
        Ok(())
    }
}

fn print_status(base: &str, status: &IndexStatus) {
    println!("Knowledge base: {}", base);
    match &status.published {
        Some(meta) => {
            println!("  Version: {}", meta.version_id);
            println!("  Built: {}", meta.created_at.to_rfc3339());
            println!("  Documents: {}", meta.document_count);
            println!("  Chunks: {}", meta.chunk_count);
            println!(
                "  Embeddings: {} / {} ({} dims)",
                meta.embedding_provider, meta.embedding_model_id, meta.embedding_dimensions
            );
        }
        None => println!("  Version: (not built)"),
    }

    match &status.lock {
        LockState::Free => println!("  Lock: free"),
        LockState::Held { holder, age_secs } => {
            println!("  Lock: held by {} for {}s", holder, age_secs)
        }
        LockState::Stale { holder, age_secs } => {
            println!("  Lock: stale ({} for {}s, reclaimable)", holder, age_secs)
        }
    }

    if status.backups.is_empty() {
        println!("  Backups: none");
    } else {
        println!("  Backups:");
        for version in status.backups.iter().rev() {
            println!("    {}", version);
        }
    }

    if !status.corrupt_backups.is_empty() {
        println!("  Unreadable indexes set aside:");
        for name in status.corrupt_backups.iter().rev() {
            println!("    {}", name);
        }
    }
}

/// Roll back to the previous version
#[derive(Args, Debug)]
pub struct RollbackCommand {
    /// Knowledge base name
    pub base: String,
}

impl RollbackCommand {
    pub fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Rolling back knowledge base '{}'", self.base);

        let version = docent_knowledge::rollback(&config.workspace, &self.base)
            .with_context(|| format!("Rollback of '{}' failed", self.base))?;
        println!("Rolled back '{}' to {}", self.base, version);
        Ok(())
    }
}

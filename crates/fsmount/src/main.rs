//! fsmount maintenance launcher.
//!
//! Thin CLI over the mapping core: inspect a mounted repository, trigger a
//! reindex, translate between identifiers and paths.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fsmount::{CallContext, EntryResolver, MountConfig, ReindexMode};
use fsmount_store::RepoStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fsmount", about = "Filesystem repository mapping maintenance")]
struct Cli {
    /// Path to the repository config file.
    #[arg(long, default_value = "fsmount.toml", env = "FSMOUNT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show mapping statistics for the repository.
    Status,
    /// Walk the whole tree and repair the mapping.
    Reindex {
        /// Return immediately and index on a background task.
        #[arg(long)]
        background: bool,
    },
    /// Resolve a numeric identifier to its filesystem path.
    Resolve { id: i64 },
    /// Map a path to its numeric identifier, creating one if needed.
    Map { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fsmount=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = MountConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let store = RepoStore::open(&config.database_path)
        .await
        .context("Failed to open the repository store")?;
    let repository_id = config.repository_id;
    let resolver = EntryResolver::new(config, store.clone())
        .await
        .context("Failed to initialize the entry resolver")?;

    match cli.command {
        Command::Status => {
            let entries = store.entry_count(repository_id).await?;
            let mappings = store.mapping_count(repository_id).await?;
            let indexing = resolver.indexer().is_running().await?;
            println!("root:      {}", resolver.root().display());
            println!("entries:   {entries}");
            println!("mappings:  {mappings}");
            println!("reindex:   {}", if indexing { "running" } else { "idle" });
        }
        Command::Reindex { background } => {
            let mode = if background {
                ReindexMode::Async
            } else {
                ReindexMode::Sync
            };
            if resolver.reindex(mode).await {
                println!("reindex {}", if background { "started" } else { "finished" });
            } else {
                println!("reindex skipped or failed (see logs)");
                std::process::exit(1);
            }
        }
        Command::Resolve { id } => {
            let path = resolver.id_to_path(CallContext::external(), id).await?;
            println!("{}", path.display());
        }
        Command::Map { path } => {
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()?.join(path)
            };
            let id = resolver.path_to_id(CallContext::external(), &path).await?;
            println!("{id}");
        }
    }

    Ok(())
}

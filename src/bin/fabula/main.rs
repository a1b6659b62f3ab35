//! fabula CLI tool
//!
//! Command-line interface for the story knowledge base index.
//!
//! ## Commands
//!
//! - `index`: force a full rebuild of the SQLite projection
//! - `fresh`: rebuild only if the document store changed
//! - `timeline switch <name>`: git checkout with cache-aware reindexing
//! - `status`: project, branch, and index freshness
//! - `review`: summary of ingested data
//! - `commit`: seed the base decision + main timeline and tag `v0-ingested`
//!
//! The LLM ingestion pipeline (parse/extract/infer/envision) lives in
//! separate tooling; this binary only manages the derived index and
//! timelines.

use clap::{Parser, Subcommand};
use fabula::{
    config::ProjectLayout,
    hash::fingerprint,
    index::{ensure_fresh, read_version_marker, reindex},
    timeline::{commit_baseline, current_branch, review_summary, switch_timeline, SwitchOutcome},
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fabula")]
#[command(author, version, about = "Story knowledge base index and timeline manager", long_about = None)]
struct Cli {
    /// Project root directory (defaults to FABULA_PROJECT_ROOT or the
    /// current directory)
    #[arg(short = 'C', long, global = true)]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the SQLite index from YAML files, regardless of staleness
    Index,

    /// Rebuild the index only if the document store changed
    Fresh,

    /// Manage timelines (git branches over the document store)
    Timeline {
        #[command(subcommand)]
        command: TimelineCommands,
    },

    /// Show project path, git branch, and index freshness
    Status,

    /// Print a summary of ingested data
    Review,

    /// Create decision_000 and the main timeline, then git commit + tag
    /// v0-ingested
    Commit,
}

#[derive(Subcommand)]
enum TimelineCommands {
    /// Switch to a timeline: git checkout plus cache-aware reindex
    Switch {
        /// Timeline/branch name to switch to
        name: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let layout = ProjectLayout::discover(cli.project_root)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Index => {
            runtime.block_on(reindex(&layout))?;
            println!("Index rebuilt.");
        }

        Commands::Fresh => {
            let rebuilt = runtime.block_on(ensure_fresh(&layout))?;
            if rebuilt {
                println!("Index was stale and has been rebuilt.");
            } else {
                println!("Index is fresh.");
            }
        }

        Commands::Timeline { command } => match command {
            TimelineCommands::Switch { name } => {
                let outcome = runtime.block_on(switch_timeline(&layout, &name))?;
                match outcome {
                    SwitchOutcome::CacheHit => {
                        println!("Switched to timeline: {name} (index restored from cache)")
                    }
                    SwitchOutcome::Rebuilt => {
                        println!("Switched to timeline: {name} (index rebuilt)")
                    }
                }
            }
        },

        Commands::Status => {
            println!("Project: {}", layout.name);
            println!("Path: {}", layout.project_dir().display());
            match runtime.block_on(current_branch(&layout)) {
                Ok(Some(branch)) => println!("Git: active (branch: {branch})"),
                Ok(None) => println!("Git: active (detached)"),
                Err(_) => println!("Git: not initialized (run `fabula commit` to seed)"),
            }
            if layout.project_dir().is_dir() {
                let current = fingerprint(&layout.project_dir())?;
                let fresh =
                    read_version_marker(&layout.version_path()).as_deref() == Some(current.as_str());
                println!("Index: {}", if fresh { "fresh" } else { "stale" });
            } else {
                println!("Index: no document store at this path");
            }
        }

        Commands::Review => {
            println!("{}", review_summary(&layout));
        }

        Commands::Commit => {
            runtime.block_on(commit_baseline(&layout))?;
            println!("COMMIT complete: decision_000, main timeline, v0-ingested.");
        }
    }

    Ok(())
}

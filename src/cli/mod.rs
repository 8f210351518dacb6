//! CLI entry point and argument parsing.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "pagelift")]
#[command(about = "OCR quality convergence pipeline for scanned document archives")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "PAGELIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Register image files under the data directory as pages
    Import {
        /// Limit number of images to register (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Run the full pipeline: assess, rescan, and correct
    Run {
        /// Number of workers (defaults to config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Limit number of pages to process (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Assess and rescan only (no billed correction calls)
    Scan {
        #[arg(short, long)]
        workers: Option<usize>,
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Run the correction pass over acceptable pages
    Correct {
        #[arg(short, long)]
        workers: Option<usize>,
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Manage the reprocessing queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Show page, queue, and spend statistics
    Status,

    /// Show one page's quality state and latest correction
    Show {
        /// Page ID to display
        page_id: String,
    },

    /// Resolve the human-review marker on a page
    Review {
        /// Page ID to mark as reviewed
        page_id: String,
    },

    /// Reset a failed page for another round of automatic processing
    Reset {
        /// Page ID to reset
        page_id: String,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Enqueue a page for a higher-effort OCR pass (no-op if already queued)
    Add {
        /// Page ID to enqueue
        page_id: String,
        /// Why the page needs reprocessing
        #[arg(short, long, default_value = "manual enqueue")]
        reason: String,
        /// Higher is more urgent
        #[arg(short, long, default_value = "0")]
        priority: i32,
    },
    /// List queue entries
    List {
        /// Filter by status (queued, processing, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Process queued entries with the full strategy ladder
    Drain {
        /// Limit number of entries to process (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },
    /// Move a failed entry back to queued
    Retry {
        /// Queue entry ID
        id: i64,
    },
}

/// Parse arguments and dispatch.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&settings).await,
        Commands::Import { limit } => commands::cmd_import(&settings, limit).await,
        Commands::Run { workers, limit } => {
            commands::cmd_pipeline(
                &settings,
                crate::pipeline::PipelineMode::Full,
                workers,
                limit,
            )
            .await
        }
        Commands::Scan { workers, limit } => {
            commands::cmd_pipeline(
                &settings,
                crate::pipeline::PipelineMode::ScanOnly,
                workers,
                limit,
            )
            .await
        }
        Commands::Correct { workers, limit } => {
            commands::cmd_pipeline(
                &settings,
                crate::pipeline::PipelineMode::CorrectOnly,
                workers,
                limit,
            )
            .await
        }
        Commands::Queue { command } => match command {
            QueueCommands::Add {
                page_id,
                reason,
                priority,
            } => commands::cmd_queue_add(&settings, &page_id, &reason, priority).await,
            QueueCommands::List { status, limit } => {
                commands::cmd_queue_list(&settings, status.as_deref(), limit).await
            }
            QueueCommands::Drain { limit } => commands::cmd_queue_drain(&settings, limit).await,
            QueueCommands::Retry { id } => commands::cmd_queue_retry(&settings, id).await,
        },
        Commands::Status => commands::cmd_status(&settings).await,
        Commands::Show { page_id } => commands::cmd_show(&settings, &page_id).await,
        Commands::Review { page_id } => commands::cmd_review(&settings, &page_id).await,
        Commands::Reset { page_id } => commands::cmd_reset(&settings, &page_id).await,
    }
}

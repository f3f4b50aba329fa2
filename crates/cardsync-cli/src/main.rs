//! cardsync - command-line host for the cardsync library index.
//!
//! Builds the core from a settings file, then either watches the configured
//! roots until interrupted or runs a single command and exits.

mod commands;

use anyhow::{Context, Result};
use cardsync_core::CardSync;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "cardsync")]
#[command(about = "Keep a character card index in sync with your card folders")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Directory for the index database and thumbnails
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Settings file (defaults to settings.json in the data directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan configured roots, then watch them and print events until Ctrl-C
    Watch,
    /// Scan the given roots once and print the results
    Scan {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
    /// List known libraries with their counts
    Libraries,
    /// List or search cards
    List {
        #[arg(long)]
        library: Option<String>,
        /// Required tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Full-text query
        #[arg(long)]
        text: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Generate missing thumbnails for a library
    Thumbnails { library: String },
    /// Run pattern rules from a JSON file over a library
    Patterns {
        library: String,
        /// JSON array of {"id", "pattern", "flags"} objects
        #[arg(long)]
        rules: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let data_dir = match args.data_dir {
        Some(path) => path,
        None => dirs::data_dir()
            .map(|dir| dir.join("cardsync"))
            .context("no platform data directory; pass --data-dir")?,
    };
    let settings_path = args
        .settings
        .unwrap_or_else(|| data_dir.join("settings.json"));
    info!("Data directory: {}", data_dir.display());

    let watching = matches!(args.command, Command::Watch);
    let sync = CardSync::builder(&data_dir)
        .auto_create_dirs(true)
        .start_watchers(watching)
        .with_settings_provider(Arc::new(cardsync_core::JsonSettingsProvider::new(
            &settings_path,
        )))
        .build()
        .await
        .with_context(|| format!("failed to open cardsync at {}", data_dir.display()))?;

    let outcome = match args.command {
        Command::Watch => commands::watch(&sync).await,
        Command::Scan { roots } => commands::scan(&sync, &roots).await,
        Command::Libraries => commands::libraries(&sync),
        Command::List {
            library,
            tags,
            text,
            limit,
            offset,
        } => commands::list(
            &sync,
            cardsync_core::CardQuery {
                library_id: library,
                tags,
                text,
                limit,
                offset,
            },
        ),
        Command::Thumbnails { library } => commands::thumbnails(&sync, &library).await,
        Command::Patterns { library, rules } => commands::patterns(&sync, &library, &rules).await,
    };

    sync.shutdown()?;
    outcome
}

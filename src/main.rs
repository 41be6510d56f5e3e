//! Canopy driver binary: a thin CLI over the indexing/watching/search
//! pipeline. No wire protocol or UI surface here — each subcommand drives
//! the library crates directly and prints a plain-text summary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Code-intelligence indexing, watching, and semantic search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the initial full index and exit
    Index,
    /// Run the initial index, then watch for changes until interrupted
    Watch,
    /// Index and compute embeddings for every component
    Embed,
    /// Index, embed, and run a semantic search query
    Search {
        query: String,
        #[arg(short, long, default_value = "10")]
        k: usize,
    },
    /// Clear the `.canopy/` cache directory
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("canopy={log_level}")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("canopy v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Index => commands::index(cli.root).await,
        Commands::Watch => commands::watch(cli.root).await,
        Commands::Embed => commands::embed(cli.root).await,
        Commands::Search { query, k } => commands::search(cli.root, query, k).await,
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("canopy v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

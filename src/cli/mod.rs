//! Command-line interface.
//!
//! Parses arguments, resolves settings once, and dispatches to one module
//! per command.

mod crawl;
mod extract;
mod rotate;
mod search;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "onionscope")]
#[command(about = "Keyword reconnaissance crawler for Tor hidden services")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory receiving session directories
    #[arg(short, long, global = true, env = "ONIONSCOPE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Tor SOCKS endpoint (host:port)
    #[arg(long, global = true)]
    socks: Option<String>,

    /// Tor control endpoint (host:port), enables identity rotation
    #[arg(long, global = true)]
    control: Option<String>,

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
    /// Resolve, render, and report hidden services matching a keyword
    Crawl {
        /// Keyword or phrase to search for
        keyword: String,
        /// Number of candidate addresses to crawl (1-50)
        #[arg(short = 'n', long, default_value = "5")]
        max_results: usize,
        /// 0 = seed pages only, 1 or 2 = also follow up to 5 internal links per seed
        #[arg(short, long)]
        depth: Option<u8>,
        /// Request a new Tor circuit before every page (needs --control)
        #[arg(short, long)]
        rotate: bool,
        /// Stop after this many seconds and write a partial report
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Seeds crawled in parallel when not rotating
        #[arg(short = 'w', long, env = "ONIONSCOPE_CONCURRENCY")]
        workers: Option<usize>,
    },

    /// Resolve candidate addresses only, without rendering
    Search {
        keyword: String,
        #[arg(short = 'n', long, default_value = "5")]
        max_results: usize,
        /// Merge results from every engine instead of stopping at the first
        #[arg(long)]
        accumulate: bool,
    },

    /// Ask Tor for a new circuit
    Rotate,

    /// Extract identifiers and keyword excerpts from a saved page
    Extract {
        /// Text or HTML file
        file: PathBuf,
        /// Keyword for excerpts and relevance
        #[arg(short, long)]
        keyword: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let workers = match &cli.command {
        Commands::Crawl { workers, .. } => *workers,
        _ => None,
    };
    let options = LoadOptions {
        config_path: cli.config,
        output_dir: cli.output_dir,
        socks: cli.socks,
        control: cli.control,
        concurrency: workers,
    };
    let settings = load_settings_with_options(options)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Crawl {
            keyword,
            max_results,
            depth,
            rotate,
            deadline_secs,
            workers: _,
        } => {
            let depth = depth.unwrap_or(settings.default_depth);
            crawl::cmd_crawl(&settings, &keyword, max_results, depth, rotate, deadline_secs).await
        }
        Commands::Search {
            keyword,
            max_results,
            accumulate,
        } => search::cmd_search(&settings, &keyword, max_results, accumulate).await,
        Commands::Rotate => rotate::cmd_rotate(&settings).await,
        Commands::Extract { file, keyword } => {
            extract::cmd_extract(&file, keyword.as_deref()).await
        }
    }
}

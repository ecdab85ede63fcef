//! # Prompt Finder CLI (`pfind`)
//!
//! ## Usage
//!
//! ```bash
//! pfind --config ./config/pfind.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pfind search "<query>"` | Suggest a prompt and explain it |
//! | `pfind candidates "<query>"` | Show the selected prompts without calling the generator |
//! | `pfind stats` | Show index statistics |
//! | `pfind refresh` | Rebuild the index and show statistics |
//! | `pfind serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Tune the threshold while curating the library
//! pfind candidates "翻訳" --threshold 0.05 --limit 10
//!
//! # Ask for a suggestion
//! pfind search "turn meeting notes into action items"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use prompt_finder::{config, logging, search, server, stats};

/// Prompt Finder CLI: suggest a reusable prompt for a free-text question.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pfind.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pfind",
    about = "Prompt Finder: suggest a reusable prompt from a Notion prompt library",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pfind.toml")]
    config: PathBuf,

    /// Show info-level diagnostics on stderr for one-shot commands.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Suggest a prompt for a question.
    ///
    /// Retrieves the closest prompts and asks the configured generator to
    /// recommend one. Prints "No relevant prompt found." when nothing clears
    /// the relevance threshold.
    Search {
        /// Free-text question.
        query: String,
    },

    /// List the prompts a query would select, with scores.
    ///
    /// Does not call the generator.
    Candidates {
        /// Free-text question.
        query: String,

        /// Override `retrieval.relevance_threshold`.
        #[arg(long)]
        threshold: Option<f64>,

        /// Override `retrieval.max_results`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show index statistics.
    Stats,

    /// Rebuild the index from the knowledge base.
    Refresh,

    /// Start the JSON HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve => "info",
        _ if cli.verbose => "info",
        _ => "warn",
    };
    logging::init(default_level);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Search { query } => {
            search::run_search(&cfg, &query).await?;
        }
        Commands::Candidates {
            query,
            threshold,
            limit,
        } => {
            if let Some(t) = threshold {
                if !(0.0..1.0).contains(&t) {
                    anyhow::bail!("--threshold must be in [0.0, 1.0)");
                }
            }
            if limit == Some(0) {
                anyhow::bail!("--limit must be >= 1");
            }
            search::run_candidates(&cfg, &query, threshold, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Refresh => {
            search::run_refresh(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

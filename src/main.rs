//! # docsift CLI (`sift`)
//!
//! The `sift` binary ingests files into a local BM25 index and searches it.
//! The index is kept in a JSON snapshot between invocations.
//!
//! ## Usage
//!
//! ```bash
//! sift --config ./config/sift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sift ingest <paths>` | Ingest files and directories |
//! | `sift search "<query>"` | Ranked chunk search |
//! | `sift context "<query>"` | Concatenated context within a token budget |
//! | `sift get <id>` | Show a document and its chunks |
//! | `sift list` | List documents |
//! | `sift delete <id>` | Remove a document and its index entries |
//! | `sift stats` | Corpus statistics |
//! | `sift reindex` | Rebuild postings and statistics from chunks |
//! | `sift vacuum` | Drop orphaned index entries |
//! | `sift backup <file>` / `sift restore <file>` | Snapshot export and import |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docsift::config;
use docsift::progress::ProgressMode;
use docsift::search::SearchOverrides;
use docsift::snapshot::{open_engine, save_engine};
use docsift::{get, ingest, maintenance, search, stats};

/// docsift: hierarchical BM25 search over local business documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "sift",
    about = "docsift: hierarchical BM25 search over local business documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files and directories.
    ///
    /// Directories are walked with the `[ingest]` globs; explicit files are
    /// always ingested. Re-ingesting an unchanged file is a no-op.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Progress on stderr: `human`, `json`, or `off`. Defaults to human
        /// on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Print the ingested documents as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search indexed documents.
    Search {
        query: String,

        /// Documents kept by the coarse stage.
        #[arg(long)]
        top_k: Option<usize>,

        /// Chunks returned.
        #[arg(long)]
        top_n: Option<usize>,

        /// Drop hits scoring below this.
        #[arg(long)]
        min_score: Option<f64>,

        /// Score every chunk directly instead of documents first.
        #[arg(long)]
        flat: bool,

        /// Expand the query with pseudo-relevance feedback.
        #[arg(long)]
        prf: bool,

        /// Attach per-term score breakdowns.
        #[arg(long)]
        explain: bool,

        #[arg(long)]
        json: bool,
    },

    /// Print relevant chunks concatenated within a token budget.
    Context {
        query: String,

        #[arg(long, default_value_t = 2000)]
        budget: u64,
    },

    /// Show a document and its chunks.
    Get {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// List documents.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Delete a document, its chunks, and its postings.
    Delete { id: String },

    /// Corpus statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Rebuild postings, terms, and statistics from the stored chunks.
    Reindex,

    /// Remove orphaned chunks, postings, and terms.
    Vacuum,

    /// Write the index to a snapshot file.
    Backup { file: PathBuf },

    /// Replace the index with a snapshot file.
    Restore { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_minimal(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            paths,
            progress,
            json,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let engine = open_engine(&cfg).await?;
            let summary = ingest::ingest_paths(&engine, &paths, &cfg.ingest, mode).await?;
            save_engine(&engine, &cfg).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "ingest: {} indexed, {} failed, {} skipped",
                    summary.completed, summary.failed, summary.skipped
                );
                for doc in summary.documents.iter().filter(|d| d.error.is_some()) {
                    println!(
                        "  {}: {}",
                        doc.name,
                        doc.error.as_deref().unwrap_or_default()
                    );
                }
            }
        }
        Commands::Search {
            query,
            top_k,
            top_n,
            min_score,
            flat,
            prf,
            explain,
            json,
        } => {
            let overrides = SearchOverrides {
                top_k,
                top_n,
                min_score,
                flat,
                prf,
                explain,
            };
            search::run_search(&cfg, &query, &overrides, json).await?;
        }
        Commands::Context { query, budget } => {
            search::run_context(&cfg, &query, budget).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::List { json } => {
            get::run_list(&cfg, json).await?;
        }
        Commands::Delete { id } => {
            get::run_delete(&cfg, &id).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Reindex => {
            maintenance::run_reindex(&cfg).await?;
        }
        Commands::Vacuum => {
            maintenance::run_vacuum(&cfg).await?;
        }
        Commands::Backup { file } => {
            maintenance::run_backup(&cfg, &file).await?;
        }
        Commands::Restore { file } => {
            maintenance::run_restore(&cfg, &file).await?;
        }
    }

    Ok(())
}

//! # RUC Harness CLI (`ruc`)
//!
//! Loads the taxpayer registry into SQLite and serves it read-only.
//!
//! ## Usage
//!
//! ```bash
//! ruc --config ./config/ruc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ruc init` | Create the SQLite database and run schema migrations |
//! | `ruc sync` | Run the full pipeline once (discover, download, extract, ingest) |
//! | `ruc ingest [DIR]` | Ingest already-extracted data without downloading |
//! | `ruc get <TAX_ID>` | Look up one taxpayer |
//! | `ruc stats` | Record counts and last sync per source |
//! | `ruc serve` | Start the read API and the daily sync schedule |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use ruc_harness::ingest::DirectoryIngestor;
use ruc_harness::models::RunSummary;
use ruc_harness::pipeline::Pipeline;
use ruc_harness::store::{RecordStore, SqliteStore};
use ruc_harness::{config, get, logging, migrate, schedule, server, stats};

/// RUC Harness CLI: load the published taxpayer registry into SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ruc.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ruc",
    about = "RUC Harness: taxpayer registry ingestion and lookup",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ruc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Run the ingestion pipeline once.
    ///
    /// Discovers archive URLs, downloads and extracts each source, and
    /// upserts every record. Failed sources are reported, not fatal.
    Sync,

    /// Ingest extracted registry files without downloading.
    ///
    /// With no argument, every `<prefix>*` directory under the configured
    /// extraction root is ingested.
    Ingest {
        /// A single extracted source directory (e.g. `data/extracted/ruc3`).
        dir: Option<PathBuf>,
    },

    /// Look up a taxpayer.
    Get {
        /// Tax id, or identity document number with `--document`.
        key: String,

        /// Treat the key as an identity document number (tax id prefix).
        #[arg(long)]
        document: bool,
    },

    /// Show record counts and the last sync outcome per source.
    Stats,

    /// Start the read API and the periodic sync schedule.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let writes_run_log = matches!(cli.command, Commands::Sync | Commands::Serve);
    logging::init(&cfg.logging, writes_run_log)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync => {
            let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&cfg).await?);
            let pipeline = Pipeline::from_config(&cfg, store)?;
            let summary = pipeline.run_once().await;
            print_summary(&summary);
        }
        Commands::Ingest { dir } => {
            let store = SqliteStore::open(&cfg).await?;
            let ingestor =
                DirectoryIngestor::new(&store, cfg.ingest.batch_size, &cfg.ingest.include_globs)?;
            let stats = match dir {
                Some(dir) => ingestor.ingest(&dir).await?,
                None => {
                    ingestor
                        .ingest_root(&cfg.fetch.extract_dir, &cfg.fetch.file_prefix)
                        .await?
                }
            };
            println!("ingest");
            println!("  records processed: {}", stats.processed);
            println!("  record errors: {}", stats.errors);
            println!("ok");
            store.pool().close().await;
        }
        Commands::Get { key, document } => {
            get::run_get(&cfg, &key, document).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&cfg).await?);
            let pipeline = Arc::new(Pipeline::from_config(&cfg, store.clone())?);
            tokio::spawn(schedule::run_schedule(pipeline, cfg.schedule.clone()));
            server::run_server(&cfg.server.bind, store).await?;
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("sync");
    println!("  sources attempted: {}", summary.attempted);
    println!("  succeeded: {}", join_or_none(&summary.succeeded));
    println!("  failed: {}", join_or_none(&summary.failed));
    println!("  records processed: {}", summary.records.processed);
    println!("  record errors: {}", summary.records.errors);
    println!("  elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!("ok");
}

fn join_or_none(ids: &[String]) -> String {
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}

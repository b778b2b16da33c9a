//! tunesort-ingest - audio file organizer
//!
//! Copies audio files from a source tree into `dest/<artist>/<title><ext>`,
//! recording every decision in an import ledger so repeated runs only touch
//! new files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tunesort_common::config::load_toml_config;
use tunesort_common::logging::init_tracing;
use tunesort_ingest::config::resolve_ledger_only;
use tunesort_ingest::{
    ConfigOverrides, ImportLedger, ImportRecord, IngestConfig, OrganizePipeline, RunMode,
};

/// Command-line arguments for tunesort-ingest
#[derive(Parser, Debug)]
#[command(name = "tunesort-ingest")]
#[command(about = "Organize audio files into an artist/title library")]
#[command(version)]
struct Cli {
    /// TOML config file (default: <config dir>/tunesort/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ledger database (default: <dest>/.tunesort/ledger.db)
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Verbose logging with per-file stage trail
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy new files from the source tree into the library
    Organize {
        #[command(flatten)]
        trees: TreeArgs,

        /// Report placements without resolving, copying or writing the ledger
        #[arg(long, conflicts_with = "dry_resolve")]
        dry_run: bool,

        /// Query normalization services but do not copy or write the ledger
        #[arg(long)]
        dry_resolve: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark every file in the source tree as already handled
    Seed {
        #[command(flatten)]
        trees: TreeArgs,
    },
    /// Remove the markers written by `seed`
    Cleanup {
        /// Library root, used to locate the ledger
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
    /// Show ledger counts
    Stats {
        /// Library root, used to locate the ledger
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
    /// List ledger entries, optionally filtered by artist or title
    List {
        /// Substring of the artist or title
        #[arg(long)]
        search: Option<String>,

        /// Library root, used to locate the ledger
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
    /// Delete one ledger entry so its file is processed again
    Forget {
        /// Entry id as shown by `list`
        id: i64,

        /// Library root, used to locate the ledger
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct TreeArgs {
    /// Source tree to scan
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Library root receiving the copies
    #[arg(short, long)]
    dest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = load_toml_config(cli.config.as_deref()).context("Failed to load config")?;
    init_tracing(&loaded.toml.logging, cli.debug).context("Failed to initialize logging")?;

    info!("Starting tunesort-ingest v{}", env!("CARGO_PKG_VERSION"));
    loaded.log_source();
    let toml = loaded.toml;

    match cli.command {
        Command::Organize {
            trees,
            dry_run,
            dry_resolve,
            json,
        } => {
            let overrides = overrides(trees, cli.ledger);
            let config = IngestConfig::resolve(&overrides, &toml)?;
            let mode = RunMode {
                dry_run,
                dry_resolve,
                debug: cli.debug,
            };

            let pipeline = OrganizePipeline::open(config, mode)
                .await
                .context("Failed to open ledger")?;
            let summary = pipeline.run().await?;
            pipeline.ledger().close().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary.display_string());
            }
        }
        Command::Seed { trees } => {
            let overrides = overrides(trees, cli.ledger);
            let config = IngestConfig::resolve(&overrides, &toml)?;

            let pipeline = OrganizePipeline::open(config, RunMode::default())
                .await
                .context("Failed to open ledger")?;
            let report = pipeline.bulk_seed().await?;
            pipeline.ledger().close().await;

            println!(
                "Seeded {} audio and {} other files ({} already in ledger)",
                report.seeded_audio, report.seeded_non_audio, report.already_known
            );
        }
        Command::Cleanup { dest } => {
            let ledger = open_ledger(dest, cli.ledger, &toml).await?;
            let removed = ledger.cleanup_bulk().await?;
            ledger.close().await;

            println!("Removed {} bulk-import markers", removed);
        }
        Command::Stats { dest } => {
            let ledger = open_ledger(dest, cli.ledger, &toml).await?;
            let stats = ledger.stats().await?;
            ledger.close().await;

            println!("{}", stats.display_string());
        }
        Command::List { search, dest } => {
            let ledger = open_ledger(dest, cli.ledger, &toml).await?;
            let records = match search.as_deref() {
                Some(term) => ledger.search(term).await?,
                None => ledger.all().await?,
            };
            ledger.close().await;

            if records.is_empty() {
                println!("No entries found.");
            }
            for record in &records {
                println!("{}", format_record(record));
            }
        }
        Command::Forget { id, dest } => {
            let ledger = open_ledger(dest, cli.ledger, &toml).await?;
            let record = ledger.get(id).await?;
            let removed = ledger.delete(id).await?;
            ledger.close().await;

            match record {
                Some(record) if removed => println!("Removed {}", format_record(&record)),
                _ => anyhow::bail!("No ledger entry with id {}", id),
            }
        }
    }

    Ok(())
}

fn format_record(record: &ImportRecord) -> String {
    format!(
        "{:>6}  {}  {} - {}  ->  {}  ({})",
        record.id,
        record.original_name,
        record.ai_artist,
        record.ai_title,
        record.storage_path,
        record.date_added
    )
}

fn overrides(trees: TreeArgs, ledger: Option<PathBuf>) -> ConfigOverrides {
    ConfigOverrides {
        source_root: trees.source,
        dest_root: trees.dest,
        ledger_path: ledger,
    }
}

async fn open_ledger(
    dest: Option<PathBuf>,
    ledger: Option<PathBuf>,
    toml: &tunesort_common::config::TomlConfig,
) -> Result<ImportLedger> {
    let overrides = ConfigOverrides {
        source_root: None,
        dest_root: dest,
        ledger_path: ledger,
    };
    let path = resolve_ledger_only(&overrides, toml)?;
    info!("Ledger: {}", path.display());

    ImportLedger::open(&path)
        .await
        .with_context(|| format!("Failed to open ledger {}", path.display()))
}

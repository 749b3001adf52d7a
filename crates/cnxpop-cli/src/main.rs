//! cnx-archive-populate
//!
//! Populates a cnx-archive store from a legacy repository's complete zip:
//! acquire the zip for each requested version, then ingest its modules and
//! the collection itself.

use anyhow::{Context, Result};
use clap::Parser;
use cnxpop_model::IdentityMapping;
use cnxpop_populate::{config, IngestConfig, Ingestor};
use cnxpop_storage::SqliteStore;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod acquire;

#[derive(Parser)]
#[command(name = "cnx-archive-populate")]
#[command(author, version, about = "Populate a cnx-archive store from a legacy repository")]
struct Cli {
    /// Collection legacy id (e.g. col11496)
    collection_id: String,

    /// Versions to ingest
    #[arg(long, num_args = 1.., default_value = config::DEFAULT_VERSION)]
    versions: Vec<String>,

    /// Legacy repository the complete zips are downloaded from
    #[arg(short = 'u', long, default_value = config::DEFAULT_LEGACY_HOST)]
    legacy_url: String,

    /// Archive store: a SQLite path or `:memory:`
    #[arg(short = 'p', long, default_value = "cnxarchive.db")]
    db: String,

    /// CSV of `legacy_id,uuid,ident` rows for units that already have an identity
    #[arg(short = 'm', long)]
    ident_mapping: Option<PathBuf>,

    /// Where complete zips are downloaded and extracted
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Create the archive tables and seed licenses and tags if absent
    #[arg(long)]
    init_schema: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = IngestConfig {
        output_dir: cli.output_dir,
        legacy_host: cli.legacy_url,
        versions: cli.versions,
    };

    let mapping = match &cli.ident_mapping {
        Some(path) => IdentityMapping::from_csv_path(path)
            .with_context(|| format!("failed to load identity mapping {}", path.display()))?,
        None => IdentityMapping::new(),
    };
    info!(entries = mapping.len(), "identity mapping loaded");

    let mut store =
        SqliteStore::open(&cli.db).with_context(|| format!("failed to open store `{}`", cli.db))?;
    if cli.init_schema {
        store.ensure_schema().context("failed to create archive schema")?;
    }

    for version in &config.versions {
        let archive = acquire::acquire(&config, &cli.collection_id, version).with_context(|| {
            format!(
                "failed to acquire {} version {version}",
                cli.collection_id
            )
        })?;

        let report = Ingestor::new(&config, &mut store, &mapping)
            .ingest(&archive)
            .with_context(|| format!("failed to ingest {}", archive.root().display()))?;

        let missing = report.missing_resources().count();
        if missing > 0 {
            warn!(
                collection = %report.collection.legacy_id,
                missing,
                "ingestion finished with missing resources"
            );
        }
        info!(
            collection = %report.collection.legacy_id,
            uuid = %report.collection.uuid,
            ident = report.collection.ident,
            modules = report.modules.len(),
            "collection populated"
        );
    }

    Ok(())
}

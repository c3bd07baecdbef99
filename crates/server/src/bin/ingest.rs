//! ingest: load raw consultations from a JSON Lines file into the
//! PostgreSQL record store.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinai_server::config::Config;
use clinai_server::db::{self, PgRecordStore, RecordStore};
use clinai_server::ingest::{self, DEFAULT_BATCH_SIZE, DEFAULT_MAX_RECORDS, IngestOptions};

#[derive(Parser)]
#[command(name = "ingest")]
#[command(about = "Load {idx, conversation, note} rows into the ClinAI record store")]
struct Cli {
    /// JSON Lines input file, `-` for stdin
    input: PathBuf,
    /// Number of records per bulk insert
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Maximum number of rows to ingest, -1 for all
    #[arg(long, default_value_t = DEFAULT_MAX_RECORDS as i64, allow_negative_numbers = true)]
    max_records: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let database_url = config
        .database_url
        .ok_or("DATABASE_URL must be set to ingest records")?;

    let store = PgRecordStore::new(db::create_pool(&database_url)?);
    store.migrate().await?;

    let options = IngestOptions {
        batch_size: cli.batch_size,
        max_records: usize::try_from(cli.max_records).ok(),
    };
    tracing::info!(
        input = %cli.input.display(),
        batch_size = options.batch_size,
        max_records = ?options.max_records,
        "Starting ingestion"
    );

    let report = if cli.input.as_os_str() == "-" {
        ingest::ingest(&store, BufReader::new(tokio::io::stdin()), &options).await
    } else {
        let file = tokio::fs::File::open(&cli.input).await?;
        ingest::ingest(&store, BufReader::new(file), &options).await
    };
    store.close();
    let report = report?;

    tracing::info!(
        rows = report.rows,
        skipped = report.skipped,
        inserted = report.inserted,
        failed_batches = report.failed_batches,
        "Ingestion complete"
    );
    Ok(())
}

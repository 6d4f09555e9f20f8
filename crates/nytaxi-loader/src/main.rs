//! nytaxi - NYC taxi data loaders

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use nytaxi_common::logging::{init_logging, LogConfig};
use nytaxi_loader::config::{self, DatabaseConfig, FanoutConfig, IngestConfig};
use nytaxi_loader::fanout::{self, Downloader};
use nytaxi_loader::ingest::{
    Fetcher, IngestPipeline, IngestReport, LookupStatus, PgTableWriter, PrimaryStatus,
};
use nytaxi_loader::storage::{config::StorageConfig, S3Storage};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "nytaxi")]
#[command(author, version, about = "NYC taxi data loaders")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load one month of green taxi trips into PostgreSQL
    Ingest(IngestArgs),

    /// Download the FHV archives and upload them to object storage
    Upload,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// PostgreSQL user
    #[arg(long, env = "PG_USER", default_value = config::DEFAULT_PG_USER)]
    pg_user: String,

    /// PostgreSQL password
    #[arg(long, env = "PG_PASS", default_value = config::DEFAULT_PG_PASSWORD, hide_env_values = true)]
    pg_pass: String,

    /// PostgreSQL host
    #[arg(long, env = "PG_HOST", default_value = config::DEFAULT_PG_HOST)]
    pg_host: String,

    /// PostgreSQL port
    #[arg(long, env = "PG_PORT", default_value_t = config::DEFAULT_PG_PORT)]
    pg_port: u16,

    /// PostgreSQL database name
    #[arg(long, env = "PG_DB", default_value = config::DEFAULT_PG_DATABASE)]
    pg_db: String,

    /// Year of the data
    #[arg(long, env = "YEAR", default_value_t = config::DEFAULT_YEAR)]
    year: i32,

    /// Month of the data (1-12)
    #[arg(long, env = "MONTH", default_value_t = config::DEFAULT_MONTH)]
    month: u32,

    /// Table receiving the trip data
    #[arg(long, env = "TARGET_TABLE", default_value = config::DEFAULT_TARGET_TABLE)]
    target_table: String,
}

impl IngestArgs {
    fn split(self) -> (DatabaseConfig, IngestConfig) {
        let database = DatabaseConfig {
            host: self.pg_host,
            port: self.pg_port,
            user: self.pg_user,
            password: self.pg_pass,
            database: self.pg_db,
            ..DatabaseConfig::default()
        };
        let ingest = IngestConfig {
            year: self.year,
            month: self.month,
            target_table: self.target_table,
            ..IngestConfig::default()
        };
        (database, ingest)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    // Environment variables take precedence over the flags
    let log_config = LogConfig::default()
        .level(log_level)
        .file_prefix("nytaxi")
        .with_env_overrides()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Ingest(args) => {
            let (database, ingest) = args.split();
            run_ingest(database, ingest).await?;
        },
        Command::Upload => run_upload().await?,
    }

    Ok(())
}

/// Stage failures are logged, not returned; only setup errors fail the process.
async fn run_ingest(database: DatabaseConfig, ingest: IngestConfig) -> Result<()> {
    database.validate()?;
    ingest.validate()?;

    info!(
        host = %database.host,
        port = database.port,
        database = %database.database,
        year = ingest.year,
        month = ingest.month,
        table = %ingest.target_table,
        "Starting ingest"
    );

    let options = PgConnectOptions::new()
        .host(&database.host)
        .port(database.port)
        .username(&database.user)
        .password(&database.password)
        .database(&database.database);

    // Lazy so an unreachable server shows up as a failed stage
    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .acquire_timeout(Duration::from_secs(database.connect_timeout_secs))
        .connect_lazy_with(options);

    let writer = PgTableWriter::new(pool.clone(), ingest.chunk_rows);
    let pipeline = IngestPipeline::new(ingest, Fetcher::new()?);

    let report = pipeline.run(&writer).await;
    log_ingest_report(&report);

    pool.close().await;
    Ok(())
}

fn log_ingest_report(report: &IngestReport) {
    match &report.primary {
        PrimaryStatus::Loaded { rows, elapsed } => {
            info!(rows, elapsed_secs = elapsed.as_secs_f64(), "Trip data loaded")
        },
        PrimaryStatus::Failed(e) => {
            error!(error = e as &dyn std::error::Error, "Trip data not loaded")
        },
    }

    match &report.lookup {
        LookupStatus::Seeded { rows } => info!(rows, "Zone lookup seeded"),
        LookupStatus::AlreadyPresent => info!("Zone lookup already present"),
        LookupStatus::Skipped => warn!("Zone lookup skipped"),
        LookupStatus::Failed(e) => {
            error!(error = e as &dyn std::error::Error, "Zone lookup not seeded")
        },
    }
}

async fn run_upload() -> Result<()> {
    let config = FanoutConfig::default();
    config.validate()?;

    let storage = S3Storage::new(&StorageConfig::from_env()?).await?;
    let downloader = Downloader::new(config.workers)?;

    info!(
        year = config.year,
        months = config.months.len(),
        workers = config.workers,
        "Starting fan-out"
    );

    let report = fanout::run(&config, &downloader, &storage).await;
    report.log_summary();

    Ok(())
}

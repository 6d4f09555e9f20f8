//! Ingest-to-database
//!
//! Loads one month of green-taxi trips from Parquet into a PostgreSQL table,
//! replacing it wholesale, then seeds the zone lookup table from CSV if that
//! table does not exist yet.
//!
//! Errors never escape [`IngestPipeline::run`]; each stage's result lands in
//! the [`IngestReport`]. A failed primary load skips the lookup stage.

pub mod fetcher;
pub mod frame;
pub mod lookup;
pub mod table_writer;

use nytaxi_common::NytaxiError;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, instrument};

pub use fetcher::Fetcher;
pub use frame::{Cell, Column, Frame, SqlType};
pub use lookup::{LookupSeeder, SeedOutcome};
pub use table_writer::{PgTableWriter, TableWriter};

use crate::config::IngestConfig;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed")]
    Fetch { url: String, source: reqwest::Error },

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: reqwest::StatusCode },

    #[error("Failed to decode {format}: {reason}")]
    Decode { format: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Config(#[from] NytaxiError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl IngestError {
    pub fn decode(format: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            format,
            reason: reason.into(),
        }
    }
}

#[derive(Debug)]
pub enum PrimaryStatus {
    Loaded { rows: u64, elapsed: Duration },
    Failed(IngestError),
}

#[derive(Debug)]
pub enum LookupStatus {
    Seeded { rows: u64 },
    AlreadyPresent,
    /// Not attempted because the primary load failed
    Skipped,
    Failed(IngestError),
}

#[derive(Debug)]
pub struct IngestReport {
    pub primary: PrimaryStatus,
    pub lookup: LookupStatus,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        matches!(self.primary, PrimaryStatus::Loaded { .. })
            && matches!(self.lookup, LookupStatus::Seeded { .. } | LookupStatus::AlreadyPresent)
    }
}

pub struct IngestPipeline {
    config: IngestConfig,
    fetcher: Fetcher,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, fetcher: Fetcher) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    #[instrument(skip(self, writer), fields(year = self.config.year, month = self.config.month))]
    pub async fn run<W: TableWriter + ?Sized>(&self, writer: &W) -> IngestReport {
        let primary = match self.load_primary(writer).await {
            Ok((rows, elapsed)) => PrimaryStatus::Loaded { rows, elapsed },
            Err(e) => {
                error!(
                    table = %self.config.target_table,
                    error = &e as &dyn std::error::Error,
                    "Failed to ingest trip data"
                );
                return IngestReport {
                    primary: PrimaryStatus::Failed(e),
                    lookup: LookupStatus::Skipped,
                };
            },
        };

        let seeder = LookupSeeder::new(
            writer,
            &self.fetcher,
            self.config.zones_table.clone(),
            self.config.zones_url.clone(),
        );

        let lookup = match seeder.seed().await {
            Ok(SeedOutcome::Seeded { rows }) => LookupStatus::Seeded { rows },
            Ok(SeedOutcome::AlreadyPresent) => LookupStatus::AlreadyPresent,
            Err(e) => {
                error!(
                    table = %self.config.zones_table,
                    error = &e as &dyn std::error::Error,
                    "Failed to seed zone lookup"
                );
                LookupStatus::Failed(e)
            },
        };

        IngestReport { primary, lookup }
    }

    async fn load_primary<W: TableWriter + ?Sized>(
        &self,
        writer: &W,
    ) -> Result<(u64, Duration), IngestError> {
        let url = self.config.taxi_url()?;
        let started = Instant::now();

        info!(url = %url, "Downloading trip data");
        let frame = self.fetcher.fetch_parquet(&url).await?;
        info!(
            rows = frame.len(),
            columns = frame.columns().len(),
            "Decoded trip data"
        );

        let rows = writer.replace_table(&self.config.target_table, &frame).await?;
        let elapsed = started.elapsed();

        info!(
            table = %self.config.target_table,
            rows,
            elapsed_secs = elapsed.as_secs_f64(),
            "Success! Trip data loaded"
        );

        Ok((rows, elapsed))
    }
}

//! Configuration management
//!
//! Flow B (fan-out upload) runs entirely on the constants below; Flow A
//! (database ingest) takes its connection parameters and period from the CLI.

use nytaxi_common::{NytaxiError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Flow A: Ingest-to-Database
// ============================================================================

/// Base URL of the monthly trip-record Parquet files.
pub const TAXI_DATA_BASE_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data/";

/// Zone lookup CSV.
pub const ZONES_URL: &str =
    "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/misc/taxi_zone_lookup.csv";

/// Reference table seeded once from [`ZONES_URL`].
pub const ZONES_TABLE: &str = "zone_lookup";

pub const DEFAULT_TARGET_TABLE: &str = "green_taxi_data";
pub const DEFAULT_YEAR: i32 = 2025;
pub const DEFAULT_MONTH: u32 = 11;

/// Rows per insert batch when replacing a table.
pub const INSERT_CHUNK_ROWS: usize = 10_000;

pub const DEFAULT_PG_HOST: &str = "localhost";
pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_PG_USER: &str = "root";
pub const DEFAULT_PG_PASSWORD: &str = "root";
pub const DEFAULT_PG_DATABASE: &str = "ny_taxi";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 4;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Flow B: Fan-out Download/Upload
// ============================================================================

/// Release folder holding the FHV monthly CSV archives.
pub const FHV_BASE_URL: &str = "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/fhv/";

pub const FHV_YEAR: i32 = 2019;

/// Local working directory for downloaded archives.
pub const DOWNLOAD_DIR: &str = ".";

/// Object key prefix; keys are `{prefix}/{file basename}`.
pub const OBJECT_PREFIX: &str = "fhv";

/// Concurrent units of work per pool.
pub const POOL_SIZE: usize = 4;

pub const MAX_UPLOAD_ATTEMPTS: u32 = 3;

pub const RETRY_DELAY_SECS: u64 = 5;

/// Transfer chunk for uploads (8 MiB).
pub const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// S3 rejects multipart parts (other than the last) below 5 MiB.
pub const MIN_MULTIPART_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// The twelve zero-padded month identifiers, "01" through "12".
pub fn all_months() -> Vec<String> {
    (1..=12).map(|m| format!("{:02}", m)).collect()
}

/// Check a month number and render it zero-padded.
pub fn month_id(month: u32) -> Result<String> {
    if (1..=12).contains(&month) {
        Ok(format!("{:02}", month))
    } else {
        Err(NytaxiError::InvalidPeriod(format!(
            "month must be between 1 and 12, got {}",
            month
        )))
    }
}

/// Settings for the download/upload fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    pub year: i32,
    pub months: Vec<String>,
    pub base_url: String,
    pub download_dir: PathBuf,
    pub object_prefix: String,
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub chunk_size: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            year: FHV_YEAR,
            months: all_months(),
            base_url: FHV_BASE_URL.to_string(),
            download_dir: PathBuf::from(DOWNLOAD_DIR),
            object_prefix: OBJECT_PREFIX.to_string(),
            workers: POOL_SIZE,
            max_attempts: MAX_UPLOAD_ATTEMPTS,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECS),
            chunk_size: UPLOAD_CHUNK_SIZE,
        }
    }
}

impl FanoutConfig {
    /// File name for one month's archive
    pub fn file_name(&self, month: &str) -> String {
        format!("fhv_tripdata_{}-{}.csv.gz", self.year, month)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(NytaxiError::config("pool size must be greater than 0"));
        }

        if self.max_attempts == 0 {
            return Err(NytaxiError::config("max upload attempts must be greater than 0"));
        }

        if self.chunk_size < MIN_MULTIPART_CHUNK_SIZE {
            return Err(NytaxiError::Config(format!(
                "upload chunk size {} is below the {} byte multipart minimum",
                self.chunk_size, MIN_MULTIPART_CHUNK_SIZE
            )));
        }

        if self.base_url.is_empty() {
            return Err(NytaxiError::config("base URL cannot be empty"));
        }

        for month in &self.months {
            let valid = month.len() == 2
                && month.parse::<u32>().map(|m| (1..=12).contains(&m)).unwrap_or(false);
            if !valid {
                return Err(NytaxiError::InvalidPeriod(format!(
                    "month identifier '{}' is not 01-12",
                    month
                )));
            }
        }

        Ok(())
    }
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PG_HOST.to_string(),
            port: DEFAULT_PG_PORT,
            user: DEFAULT_PG_USER.to_string(),
            password: DEFAULT_PG_PASSWORD.to_string(),
            database: DEFAULT_PG_DATABASE.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(NytaxiError::config("database host cannot be empty"));
        }

        if self.port == 0 {
            return Err(NytaxiError::config("database port must be greater than 0"));
        }

        if self.database.is_empty() {
            return Err(NytaxiError::config("database name cannot be empty"));
        }

        if self.max_connections == 0 {
            return Err(NytaxiError::config("database max_connections must be greater than 0"));
        }

        Ok(())
    }
}

/// Settings for one Flow A run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub year: i32,
    pub month: u32,
    pub target_table: String,
    pub taxi_base_url: String,
    pub zones_url: String,
    pub zones_table: String,
    pub chunk_rows: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            year: DEFAULT_YEAR,
            month: DEFAULT_MONTH,
            target_table: DEFAULT_TARGET_TABLE.to_string(),
            taxi_base_url: TAXI_DATA_BASE_URL.to_string(),
            zones_url: ZONES_URL.to_string(),
            zones_table: ZONES_TABLE.to_string(),
            chunk_rows: INSERT_CHUNK_ROWS,
        }
    }
}

impl IngestConfig {
    /// `{base}green_tripdata_{YYYY}-{MM}.parquet`
    pub fn taxi_url(&self) -> Result<String> {
        Ok(format!(
            "{}green_tripdata_{}-{}.parquet",
            self.taxi_base_url,
            self.year,
            month_id(self.month)?
        ))
    }

    pub fn validate(&self) -> Result<()> {
        month_id(self.month)?;

        if self.target_table.is_empty() {
            return Err(NytaxiError::config("target table cannot be empty"));
        }

        if self.target_table == self.zones_table {
            return Err(NytaxiError::Config(format!(
                "target table '{}' would overwrite the lookup table",
                self.target_table
            )));
        }

        if self.chunk_rows == 0 {
            return Err(NytaxiError::config("insert chunk size must be greater than 0"));
        }

        Ok(())
    }
}

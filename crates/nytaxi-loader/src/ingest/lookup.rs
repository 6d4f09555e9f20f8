// One-time seed of the zone lookup table

use tracing::info;

use super::fetcher::Fetcher;
use super::table_writer::TableWriter;
use super::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded { rows: u64 },
    AlreadyPresent,
}

pub struct LookupSeeder<'a, W: TableWriter + ?Sized> {
    writer: &'a W,
    fetcher: &'a Fetcher,
    table: String,
    url: String,
}

impl<'a, W: TableWriter + ?Sized> LookupSeeder<'a, W> {
    pub fn new(writer: &'a W, fetcher: &'a Fetcher, table: String, url: String) -> Self {
        Self {
            writer,
            fetcher,
            table,
            url,
        }
    }

    /// Existing tables are left alone, whatever their contents.
    pub async fn seed(&self) -> Result<SeedOutcome, IngestError> {
        info!(table = %self.table, "Checking zone lookup data");

        if self.writer.table_exists(&self.table).await? {
            info!(table = %self.table, "Zone lookup table already exists, skipping");
            return Ok(SeedOutcome::AlreadyPresent);
        }

        info!(url = %self.url, "Downloading zone lookup data");
        let frame = self.fetcher.fetch_csv(&self.url).await?;
        let rows = self.writer.replace_table(&self.table, &frame).await?;

        info!(table = %self.table, rows, "Zone lookup data loaded");
        Ok(SeedOutcome::Seeded { rows })
    }
}

//! Table replacement in PostgreSQL
//!
//! A replace is one transaction: drop, create from the frame's column types,
//! then batched multi-row inserts. Readers never see a half-written table.

use async_trait::async_trait;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use super::frame::{Cell, Frame, SqlType};
use super::IngestError;

/// PostgreSQL caps one statement at this many bind parameters.
pub const MAX_BIND_PARAMS: usize = 65_535;

#[async_trait]
pub trait TableWriter: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool, IngestError>;

    /// Replace `table` with the frame's contents; returns rows written.
    async fn replace_table(&self, table: &str, frame: &Frame) -> Result<u64, IngestError>;
}

pub struct PgTableWriter {
    pool: PgPool,
    chunk_rows: usize,
}

impl PgTableWriter {
    pub fn new(pool: PgPool, chunk_rows: usize) -> Self {
        Self { pool, chunk_rows }
    }

    fn rows_per_statement(&self, columns: usize) -> usize {
        rows_per_statement(self.chunk_rows, columns)
    }
}

pub(crate) fn rows_per_statement(chunk_rows: usize, columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).min(chunk_rows).max(1)
}

/// Double-quote an identifier, keeping its case.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn create_table_sql(table: &str, frame: &Frame) -> String {
    let columns = frame
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type.ddl()))
        .collect::<Vec<_>>()
        .join(", ");

    format!("CREATE TABLE {} ({})", quote_ident(table), columns)
}

fn insert_prefix(table: &str, frame: &Frame) -> String {
    let columns = frame
        .columns()
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    format!("INSERT INTO {} ({}) ", quote_ident(table), columns)
}

fn bind_cell(b: &mut Separated<'_, '_, Postgres, &'static str>, sql_type: SqlType, cell: &Cell) {
    match sql_type {
        SqlType::Boolean => b.push_bind(cell.as_bool()),
        SqlType::BigInt => b.push_bind(cell.as_i64()),
        SqlType::Double => b.push_bind(cell.as_f64()),
        SqlType::Text => b.push_bind(cell.as_text()),
        SqlType::Date => b.push_bind(cell.as_date()),
        SqlType::Timestamp => b.push_bind(cell.as_timestamp()),
    };
}

#[async_trait]
impl TableWriter for PgTableWriter {
    async fn table_exists(&self, table: &str) -> Result<bool, IngestError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self, frame), fields(rows = frame.len()))]
    async fn replace_table(&self, table: &str, frame: &Frame) -> Result<u64, IngestError> {
        if frame.columns().is_empty() {
            return Err(IngestError::decode("frame", "no columns to create"));
        }

        let per_statement = self.rows_per_statement(frame.columns().len());
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&create_table_sql(table, frame))
            .execute(&mut *tx)
            .await?;

        let mut written = 0u64;
        for (batch, rows) in frame.rows().chunks(per_statement).enumerate() {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new(insert_prefix(table, frame));

            query_builder.push_values(rows.iter(), |mut b, row| {
                for (cell, column) in row.iter().zip(frame.columns()) {
                    bind_cell(&mut b, column.sql_type, cell);
                }
            });

            written += query_builder.build().execute(&mut *tx).await?.rows_affected();
            debug!(batch = batch + 1, rows = rows.len(), written, "Inserted batch");
        }

        tx.commit().await?;

        info!(table, rows = written, "Replaced table");
        Ok(written)
    }
}

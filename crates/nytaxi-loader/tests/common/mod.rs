//! In-memory stand-ins for the object store and the database

#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use bytes::Bytes;
use nytaxi_loader::ingest::{Frame, IngestError, TableWriter};
use nytaxi_loader::storage::ObjectStore;
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BUCKET: &str = "nytaxi-test";

/// Object store keeping keys in memory, with scriptable failures.
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashSet<String>>,
    puts: Mutex<Vec<String>>,
    exists_calls: Mutex<Vec<String>>,
    /// Remaining failing puts per key; `u32::MAX` fails forever
    put_failures: Mutex<HashMap<String, u32>>,
    /// Remaining `exists` calls per key that report a missing object
    hidden: Mutex<HashMap<String, u32>>,
    put_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_put_delay(delay: Duration) -> Self {
        Self {
            put_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_puts(&self, key: &str, times: u32) {
        self.put_failures.lock().unwrap().insert(key.to_string(), times);
    }

    pub fn hide_after_put(&self, key: &str, times: u32) {
        self.hidden.lock().unwrap().insert(key.to_string(), times);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn puts_for(&self, key: &str) -> usize {
        self.puts.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn total_puts(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn exists_calls_for(&self, key: &str) -> usize {
        self.exists_calls.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn take_one(map: &Mutex<HashMap<String, u32>>, key: &str) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(key) {
            Some(0) | None => false,
            Some(&mut u32::MAX) => true,
            Some(remaining) => {
                *remaining -= 1;
                true
            },
        }
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    fn bucket(&self) -> &str {
        BUCKET
    }

    async fn put_file(&self, key: &str, path: &Path, _chunk_size: usize) -> anyhow::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }

        self.puts.lock().unwrap().push(key.to_string());
        let result = if !path.is_file() {
            Err(anyhow::anyhow!("{} does not exist", path.display()))
        } else if Self::take_one(&self.put_failures, key) {
            Err(anyhow::anyhow!("simulated network failure"))
        } else {
            self.objects.lock().unwrap().insert(key.to_string());
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.exists_calls.lock().unwrap().push(key.to_string());
        if Self::take_one(&self.hidden, key) {
            return Ok(false);
        }
        Ok(self.objects.lock().unwrap().contains(key))
    }
}

/// Table writer that records replacements instead of touching a database.
#[derive(Default)]
pub struct FakeTableWriter {
    tables: Mutex<HashMap<String, usize>>,
    writes: Mutex<Vec<String>>,
    failing_tables: Mutex<HashSet<String>>,
    exists_calls: AtomicUsize,
}

impl FakeTableWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str, rows: usize) -> Self {
        self.tables.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    pub fn fail_writes_to(self, table: &str) -> Self {
        self.failing_tables.lock().unwrap().insert(table.to_string());
        self
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn rows_in(&self, table: &str) -> Option<usize> {
        self.tables.lock().unwrap().get(table).copied()
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableWriter for FakeTableWriter {
    async fn table_exists(&self, table: &str) -> Result<bool, IngestError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn replace_table(&self, table: &str, frame: &Frame) -> Result<u64, IngestError> {
        self.writes.lock().unwrap().push(table.to_string());
        if self.failing_tables.lock().unwrap().contains(table) {
            return Err(IngestError::Database(sqlx::Error::PoolTimedOut));
        }
        self.tables.lock().unwrap().insert(table.to_string(), frame.len());
        Ok(frame.len() as u64)
    }
}

pub const ZONES_CSV: &str = "\"LocationID\",\"Borough\",\"Zone\",\"service_zone\"\n\
    1,\"EWR\",\"Newark Airport\",\"EWR\"\n\
    2,\"Queens\",\"Jamaica Bay\",\"Boro Zone\"\n\
    3,\"Bronx\",\"Allerton/Pelham Gardens\",\"Boro Zone\"\n";

/// A three-row green-taxi style Parquet file
pub fn green_trips_parquet() -> Bytes {
    let schema = Arc::new(
        parse_message_type(
            "message schema {
                OPTIONAL INT64 VendorID;
                OPTIONAL BYTE_ARRAY store_and_fwd_flag (UTF8);
                OPTIONAL DOUBLE fare_amount;
            }",
        )
        .unwrap(),
    );
    let props = Arc::new(WriterProperties::builder().build());
    let mut buffer = Vec::new();
    let mut writer = SerializedFileWriter::new(&mut buffer, schema, props).unwrap();
    let mut row_group = writer.next_row_group().unwrap();

    let mut column = row_group.next_column().unwrap().unwrap();
    column
        .typed::<Int64Type>()
        .write_batch(&[2, 2, 1], Some(&[1, 1, 1]), None)
        .unwrap();
    column.close().unwrap();

    let mut column = row_group.next_column().unwrap().unwrap();
    column
        .typed::<ByteArrayType>()
        .write_batch(&[ByteArray::from("N"), ByteArray::from("Y")], Some(&[1, 0, 1]), None)
        .unwrap();
    column.close().unwrap();

    let mut column = row_group.next_column().unwrap().unwrap();
    column
        .typed::<DoubleType>()
        .write_batch(&[12.5, 7.0, 31.2], Some(&[1, 1, 1]), None)
        .unwrap();
    column.close().unwrap();

    row_group.close().unwrap();
    writer.close().unwrap();

    Bytes::from(buffer)
}

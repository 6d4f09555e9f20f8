//! NYC Taxi loaders
//!
//! Two independent batch flows over the public NYC TLC trip-record data:
//!
//! - **Ingest** ([`ingest`]): one month of green-taxi trips from Parquet into a
//!   PostgreSQL table, plus a one-time seed of the zone lookup table
//! - **Fan-out** ([`fanout`]): a year of FHV monthly archives downloaded
//!   through a bounded pool, then uploaded to object storage with
//!   write-then-verify and a fixed retry budget
//!
//! Both flows run to completion and report per-item outcomes instead of
//! failing on the first error.
//!
//! # Modules
//!
//! - [`config`]: constants and the per-flow configuration structs
//! - [`pool`]: order-preserving bounded concurrency shared by both pools
//! - [`storage`]: the [`storage::ObjectStore`] seam and its S3 backend

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod fanout;
pub mod ingest;
pub mod pool;
pub mod storage;

pub use config::{DatabaseConfig, FanoutConfig, IngestConfig};
pub use fanout::FanoutReport;
pub use ingest::{IngestPipeline, IngestReport};
pub use storage::{ObjectStore, S3Storage};

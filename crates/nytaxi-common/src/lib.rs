//! NYC Taxi loaders: common library
//!
//! Shared error handling and logging for the `nytaxi` workspace members.
//!
//! - **Error Handling**: [`NytaxiError`] and the [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//!
//! # Example
//!
//! ```no_run
//! use nytaxi_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::default().file_prefix("nytaxi");
//!     let _guard = init_logging(&config.with_env_overrides()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

pub use error::{NytaxiError, Result};

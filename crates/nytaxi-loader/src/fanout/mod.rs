//! Fan-out download/upload
//!
//! Downloads a fixed set of monthly archives through one bounded pool, then
//! uploads the ones that arrived through a second, independent pool. Upload
//! starts only after every download has finished. Individual failures are
//! reported in the [`FanoutReport`] and never abort the batch.
//!
//! ```rust,ignore
//! let config = FanoutConfig::default();
//! let storage = S3Storage::new(&StorageConfig::from_env()?).await?;
//! let downloader = Downloader::new(config.workers)?;
//! let report = fanout::run(&config, &downloader, &storage).await;
//! report.log_summary();
//! ```

pub mod downloader;
pub mod error;
pub mod task;
pub mod uploader;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use downloader::Downloader;
pub use error::TransferError;
pub use task::{plan_downloads, DownloadResult, DownloadTask, UploadAttempt, UploadOutcome, UploadState};
pub use uploader::{UploadPolicy, Uploader};

use crate::config::FanoutConfig;
use crate::storage::ObjectStore;

/// What happened to every month of one run
#[derive(Debug, Clone)]
pub struct FanoutReport {
    /// One entry per planned month, in plan order
    pub downloads: Vec<DownloadResult>,
    /// One entry per successful download, in the same relative order
    pub uploads: Vec<UploadOutcome>,
}

impl FanoutReport {
    pub fn absent_months(&self) -> Vec<&str> {
        self.downloads
            .iter()
            .filter(|r| r.is_absent())
            .map(|r| r.month.as_str())
            .collect()
    }

    pub fn verified(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.uploads.iter().filter(|u| u.is_verified())
    }

    pub fn abandoned(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.uploads.iter().filter(|u| !u.is_verified())
    }

    pub fn is_complete(&self) -> bool {
        self.absent_months().is_empty() && self.abandoned().next().is_none()
    }

    pub fn log_summary(&self) {
        let verified = self.verified().count();
        let absent = self.absent_months();

        if !absent.is_empty() {
            warn!(months = ?absent, "Months skipped after download failure");
        }

        for outcome in self.abandoned() {
            warn!(
                path = %outcome.source.display(),
                attempts = outcome.attempts,
                error = ?outcome.last_error.as_ref().map(ToString::to_string),
                "Upload abandoned"
            );
        }

        info!(
            planned = self.downloads.len(),
            downloaded = self.downloads.len() - absent.len(),
            verified,
            abandoned = self.uploads.len() - verified,
            "All files processed"
        );
    }
}

/// Run both stages for every month in `config`.
pub async fn run<S: ObjectStore + ?Sized>(
    config: &FanoutConfig,
    downloader: &Downloader,
    store: &S,
) -> FanoutReport {
    let downloads = downloader.download_all(plan_downloads(config)).await;

    let paths: Vec<PathBuf> = downloads
        .iter()
        .filter_map(DownloadResult::path)
        .map(Path::to_path_buf)
        .collect();

    let uploads = Uploader::from_config(store, config).upload_all(paths).await;

    FanoutReport { downloads, uploads }
}

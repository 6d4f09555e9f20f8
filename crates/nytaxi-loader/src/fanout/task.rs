//! Work items for the fan-out: one download task per month, one upload
//! attempt tracker per downloaded file.

use std::path::{Path, PathBuf};

use super::error::TransferError;
use crate::config::FanoutConfig;
use crate::storage::object_key;

/// One month's file to fetch. Built before any work starts; never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub month: String,
    pub url: String,
    pub destination: PathBuf,
}

impl DownloadTask {
    pub fn for_month(config: &FanoutConfig, month: &str) -> Self {
        let file_name = config.file_name(month);
        Self {
            month: month.to_string(),
            url: format!("{}{}", config.base_url, file_name),
            destination: config.download_dir.join(file_name),
        }
    }
}

/// One task per configured month, in configuration order
pub fn plan_downloads(config: &FanoutConfig) -> Vec<DownloadTask> {
    config
        .months
        .iter()
        .map(|month| DownloadTask::for_month(config, month))
        .collect()
}

/// Outcome of exactly one [`DownloadTask`]. An `Err` outcome is the absence
/// marker: the month is left out of everything downstream.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub month: String,
    pub outcome: Result<PathBuf, TransferError>,
}

impl DownloadResult {
    pub fn path(&self) -> Option<&Path> {
        self.outcome.as_ref().ok().map(PathBuf::as_path)
    }

    pub fn is_absent(&self) -> bool {
        self.outcome.is_err()
    }
}

/// Per-item upload state.
///
/// `Pending -> Uploading -> Verified | UploadFailed | VerifyFailed`; both
/// failure states go back to `Pending` while attempts remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Pending,
    Uploading,
    Verified,
    UploadFailed,
    VerifyFailed,
}

impl UploadState {
    pub fn is_terminal_success(self) -> bool {
        self == UploadState::Verified
    }
}

/// Tracks one file through its upload attempts
#[derive(Debug, Clone)]
pub struct UploadAttempt {
    pub source: PathBuf,
    pub object_name: String,
    attempt: u32,
    max_attempts: u32,
    state: UploadState,
}

impl UploadAttempt {
    /// `None` when the path has no usable file name.
    pub fn new(source: PathBuf, prefix: &str, max_attempts: u32) -> Option<Self> {
        let object_name = object_key(prefix, &source)?;
        Some(Self {
            source,
            object_name,
            attempt: 0,
            max_attempts,
            state: UploadState::Pending,
        })
    }

    /// Start the next attempt. Returns false once the budget is spent or the
    /// item is already verified.
    pub fn begin(&mut self) -> bool {
        if self.state != UploadState::Pending || self.attempt >= self.max_attempts {
            return false;
        }
        self.attempt += 1;
        self.state = UploadState::Uploading;
        true
    }

    /// Record the result of the current attempt.
    pub fn finish(&mut self, result: &Result<(), TransferError>) {
        debug_assert_eq!(self.state, UploadState::Uploading);
        self.state = match result {
            Ok(()) => UploadState::Verified,
            Err(TransferError::Verify { .. }) => UploadState::VerifyFailed,
            Err(_) => UploadState::UploadFailed,
        };
    }

    /// Put a failed item back in the queue if attempts remain.
    pub fn requeue(&mut self) -> bool {
        let failed = matches!(self.state, UploadState::UploadFailed | UploadState::VerifyFailed);
        if failed && self.attempt < self.max_attempts {
            self.state = UploadState::Pending;
            true
        } else {
            false
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn state(&self) -> UploadState {
        self.state
    }
}

/// Final word on one file's upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub source: PathBuf,
    pub object_name: String,
    pub attempts: u32,
    pub state: UploadState,
    /// Failure of the last attempt, if it failed
    pub last_error: Option<TransferError>,
}

impl UploadOutcome {
    pub fn is_verified(&self) -> bool {
        self.state.is_terminal_success()
    }
}

impl From<(UploadAttempt, Option<TransferError>)> for UploadOutcome {
    fn from((attempt, last_error): (UploadAttempt, Option<TransferError>)) -> Self {
        Self {
            attempts: attempt.attempt,
            state: attempt.state,
            source: attempt.source,
            object_name: attempt.object_name,
            last_error,
        }
    }
}

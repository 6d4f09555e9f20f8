// Fan-out uploader: write, verify, retry with a fixed pause

use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::error::TransferError;
use super::task::{UploadAttempt, UploadOutcome, UploadState};
use crate::config::FanoutConfig;
use crate::pool::run_bounded;
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts, no growth or jitter
    pub retry_delay: Duration,
    pub chunk_size: usize,
}

impl From<&FanoutConfig> for UploadPolicy {
    fn from(config: &FanoutConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay,
            chunk_size: config.chunk_size,
        }
    }
}

pub struct Uploader<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    prefix: String,
    policy: UploadPolicy,
    workers: usize,
}

impl<'a, S: ObjectStore + ?Sized> Uploader<'a, S> {
    pub fn new(store: &'a S, prefix: impl Into<String>, policy: UploadPolicy, workers: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            policy,
            workers,
        }
    }

    pub fn from_config(store: &'a S, config: &FanoutConfig) -> Self {
        Self::new(store, config.object_prefix.clone(), config.into(), config.workers)
    }

    /// Upload every file through the pool; outcomes follow input order.
    pub async fn upload_all(&self, paths: Vec<PathBuf>) -> Vec<UploadOutcome> {
        info!(
            files = paths.len(),
            workers = self.workers,
            bucket = %self.store.bucket(),
            "Starting uploads"
        );
        run_bounded(paths, self.workers, |path| self.upload(path)).await
    }

    /// Drive one file to `Verified` or abandon it after the attempt budget.
    #[instrument(skip(self), fields(bucket = %self.store.bucket()))]
    pub async fn upload(&self, path: PathBuf) -> UploadOutcome {
        let Some(mut item) = UploadAttempt::new(path.clone(), &self.prefix, self.policy.max_attempts)
        else {
            let err = TransferError::Upload {
                key: path.display().to_string(),
                reason: "path has no file name".to_string(),
            };
            error!(path = %path.display(), "Cannot derive object name, skipping");
            return UploadOutcome {
                object_name: String::new(),
                source: path,
                attempts: 0,
                state: UploadState::UploadFailed,
                last_error: Some(err),
            };
        };

        let mut last_error = None;

        while item.begin() {
            info!(
                path = %item.source.display(),
                key = %item.object_name,
                attempt = item.attempt(),
                max_attempts = item.max_attempts(),
                "Uploading"
            );

            let result = self.attempt_once(&item).await;
            item.finish(&result);

            match result {
                Ok(()) => {
                    info!(key = %item.object_name, attempt = item.attempt(), "Verification successful");
                    return (item, None).into();
                },
                Err(e) => {
                    warn!(
                        key = %item.object_name,
                        attempt = item.attempt(),
                        error = %e,
                        "Upload attempt failed"
                    );
                    last_error = Some(e);
                },
            }

            if item.requeue() {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }

        error!(
            path = %item.source.display(),
            attempts = item.attempt(),
            "Giving up after exhausting upload attempts"
        );
        (item, last_error).into()
    }

    /// One write followed by an independent existence read.
    async fn attempt_once(&self, item: &UploadAttempt) -> Result<(), TransferError> {
        let key = &item.object_name;

        self.store
            .put_file(key, &item.source, self.policy.chunk_size)
            .await
            .map_err(|e| TransferError::upload(key, &e))?;

        match self.store.exists(key).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransferError::verify(key, "object not found after upload")),
            Err(e) => Err(TransferError::verify(key, format!("{:#}", e))),
        }
    }
}

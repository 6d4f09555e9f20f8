// Fan-out downloader: stream each month's archive to disk, no retries

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use super::error::TransferError;
use super::task::{DownloadResult, DownloadTask};
use crate::pool::run_bounded;

/// HTTP downloader running a fixed-size pool of transfers
pub struct Downloader {
    client: Client,
    workers: usize,
}

impl Downloader {
    pub fn new(workers: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("nytaxi-loader/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, workers))
    }

    pub fn with_client(client: Client, workers: usize) -> Self {
        Self { client, workers }
    }

    /// Download every task; the i-th result belongs to the i-th task.
    pub async fn download_all(&self, tasks: Vec<DownloadTask>) -> Vec<DownloadResult> {
        info!(tasks = tasks.len(), workers = self.workers, "Starting downloads");
        run_bounded(tasks, self.workers, |task| async move { self.download(&task).await }).await
    }

    /// Download one task. Failures become an absence marker, never an error.
    #[instrument(skip(self, task), fields(month = %task.month))]
    pub async fn download(&self, task: &DownloadTask) -> DownloadResult {
        info!(url = %task.url, "Downloading");

        let outcome = match self.fetch_to_file(&task.url, &task.destination).await {
            Ok(bytes) => {
                info!(path = %task.destination.display(), bytes, "Downloaded");
                Ok(task.destination.clone())
            },
            Err(e) => {
                warn!(url = %task.url, error = %format!("{:#}", e), "Download failed");
                Err(TransferError::download(&task.url, &e))
            },
        };

        DownloadResult {
            month: task.month.clone(),
            outcome,
        }
    }

    async fn fetch_to_file(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Only complete bodies are renamed to the final name.
        let partial = partial_path(destination);
        let result = match write_body(response, &partial).await {
            Ok(written) => tokio::fs::rename(&partial, destination)
                .await
                .with_context(|| format!("Failed to move download into {}", destination.display()))
                .map(|()| written),
            Err(e) => Err(e),
        };

        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        result
    }
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Failed to read response body")?;
        file.write_all(&chunk).await.context("Failed to write download")?;
        written += chunk.len() as u64;
    }
    file.flush().await.context("Failed to flush download")?;

    Ok(written)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

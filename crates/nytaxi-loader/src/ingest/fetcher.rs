// HTTP fetch of whole files into memory, decoded into frames

use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use super::frame::Frame;
use super::IngestError;

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, IngestError> {
        let client = Client::builder()
            .user_agent(concat!("nytaxi-loader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(IngestError::Client)?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, IngestError> {
        let fetch_err = |source| IngestError::Fetch {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(fetch_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(fetch_err)?;
        debug!(url, bytes = body.len(), "Fetched");
        Ok(body)
    }

    /// Parquet decoding is CPU-bound and runs on the blocking pool.
    pub async fn fetch_parquet(&self, url: &str) -> Result<Frame, IngestError> {
        let body = self.fetch_bytes(url).await?;
        tokio::task::spawn_blocking(move || Frame::from_parquet(body))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))?
    }

    pub async fn fetch_csv(&self, url: &str) -> Result<Frame, IngestError> {
        let body = self.fetch_bytes(url).await?;
        Frame::from_csv(&body)
    }
}

use thiserror::Error;

/// Per-item failure in the download/upload fan-out.
///
/// None of these abort the batch: a download failure drops the item, upload
/// and verify failures are retried until the attempt budget runs out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("upload to {key} failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("verification of {key} failed: {reason}")]
    Verify { key: String, reason: String },
}

impl TransferError {
    pub fn download(url: &str, err: &anyhow::Error) -> Self {
        Self::Download {
            url: url.to_string(),
            reason: format!("{:#}", err),
        }
    }

    pub fn upload(key: &str, err: &anyhow::Error) -> Self {
        Self::Upload {
            key: key.to_string(),
            reason: format!("{:#}", err),
        }
    }

    pub fn verify(key: &str, reason: impl Into<String>) -> Self {
        Self::Verify {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Download { .. })
    }
}

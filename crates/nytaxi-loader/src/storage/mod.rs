use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

pub mod config;

use config::{CredentialsSource, StorageConfig};

/// Write and existence-check operations the uploader needs from a store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket/container, for log lines
    fn bucket(&self) -> &str;

    /// Upload a local file to `key`, sending at most `chunk_size` bytes per request.
    async fn put_file(&self, key: &str, path: &Path, chunk_size: usize) -> Result<()>;

    /// Read-side check that `key` is present.
    async fn exists(&self, key: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        debug!("Initializing storage with config: {:?}", config);

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        match config.resolve_credentials()? {
            CredentialsSource::File(keys) => {
                info!(path = %config.credentials_file.display(), "Using credentials file");
                loader = loader.credentials_provider(Credentials::new(
                    keys.access_key_id,
                    keys.secret_access_key,
                    keys.session_token,
                    None,
                    "nytaxi-credentials-file",
                ));
            },
            CredentialsSource::Ambient => {
                info!("Using default credential chain");
            },
        }

        let shared = loader.load().await;
        let mut s3_config_builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    async fn put_single(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .context("Failed to upload to S3")?;

        Ok(())
    }

    async fn put_multipart(&self, key: &str, path: &Path, chunk_size: usize) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to start multipart upload")?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| anyhow!("S3 returned no upload id for {}", key))?
            .to_string();

        match self.upload_parts(key, path, &upload_id, chunk_size).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder().set_parts(Some(parts)).build(),
                    )
                    .send()
                    .await
                    .context("Failed to complete multipart upload")?;
                Ok(())
            },
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key = %key, error = %abort_err, "Failed to abort multipart upload");
                }
                Err(e)
            },
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        path: &Path,
        upload_id: &str,
        chunk_size: usize,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut parts = Vec::new();
        let mut part_number = 1i32;

        loop {
            let mut buffer = Vec::with_capacity(chunk_size);
            (&mut file)
                .take(chunk_size as u64)
                .read_to_end(&mut buffer)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            if buffer.is_empty() {
                break;
            }

            debug!(key = %key, part_number, bytes = buffer.len(), "Uploading part");

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer))
                .send()
                .await
                .with_context(|| format!("Failed to upload part {}", part_number))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            part_number += 1;
        }

        Ok(parts)
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self, path), fields(bucket = %self.bucket))]
    async fn put_file(&self, key: &str, path: &Path, chunk_size: usize) -> Result<()> {
        let size = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        if size <= chunk_size as u64 {
            self.put_single(key, path).await?;
        } else {
            self.put_multipart(key, path, chunk_size).await?;
        }

        info!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!("Failed to check S3 object existence: {}", service_error))
                }
            },
        }
    }
}

/// Object key for a local file: `{prefix}/{basename}`
pub fn object_key(prefix: &str, path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        Some(name.to_string())
    } else {
        Some(format!("{}/{}", prefix, name))
    }
}

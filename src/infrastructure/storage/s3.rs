use std::path::Path;

use aws_sdk_s3::Client;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::common::error::JobError;
use crate::config::settings::AppConfig;

const TIFF_CONTENT_TYPE: &str = "image/tiff";

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
}

impl StorageService {
    pub fn new(config: &AppConfig) -> Self {
        let credentials = Credentials::new(
            &config.aws_access_key,
            &config.aws_secret_key,
            None,
            None,
            "static",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO
        }

        let client = Client::from_conf(builder.build());

        info!("✅ Connected to S3");

        Self { client }
    }

    /// GET an object into a local file, streaming.
    pub async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), JobError> {
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| JobError::Storage(format!("GET s3://{}/{}: {}", bucket, key, e)))?;

        let mut body = object.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        Ok(())
    }

    /// GET an object fully into memory.
    pub async fn get_object_bytes(&self, bucket: &str, key: &str) -> Result<Bytes, JobError> {
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| JobError::Storage(format!("GET s3://{}/{}: {}", bucket, key, e)))?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| JobError::Storage(format!("GET s3://{}/{}: {}", bucket, key, e)))?;

        Ok(data.into_bytes())
    }

    /// PUT an in-memory artifact.
    pub async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), JobError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(TIFF_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| JobError::Storage(format!("PUT s3://{}/{}: {}", bucket, key, e)))?;

        Ok(())
    }

    /// PUT a local file, streaming from disk.
    pub async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), JobError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| JobError::Storage(format!("reading {}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(TIFF_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| JobError::Storage(format!("PUT s3://{}/{}: {}", bucket, key, e)))?;

        Ok(())
    }
}

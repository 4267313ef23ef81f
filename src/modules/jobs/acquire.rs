use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::common::error::JobError;
use crate::modules::jobs::source::{Scheme, SourceRef};
use crate::state::AppState;

/// A working copy on local disk, removed on drop. The guard is created
/// before the download starts so partial files from failed transfers are
/// cleaned up through the same path.
#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LocalFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove working file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// What the rest of the pipeline reads from: either the remote reference
/// itself, or a local working copy that disappears with the job.
pub enum AcquiredSource {
    Remote(String),
    Local(LocalFile),
}

impl AcquiredSource {
    /// Dataset path handed to the validity check and the transcoder.
    pub fn dataset(&self) -> String {
        match self {
            AcquiredSource::Remote(url) => url.clone(),
            AcquiredSource::Local(file) => file.path().display().to_string(),
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            AcquiredSource::Remote(_) => None,
            AcquiredSource::Local(file) => Some(file.path()),
        }
    }
}

/// Materialize the source into the working directory, or pass the remote
/// reference through when the job allows remote reads.
pub async fn acquire(
    state: &AppState,
    source: &SourceRef,
    allow_remote_read: bool,
) -> Result<AcquiredSource, JobError> {
    if allow_remote_read {
        return Ok(AcquiredSource::Remote(source.as_str().to_string()));
    }

    let dest = Path::new(&state.config.work_dir).join(source.filename()?);
    let guard = LocalFile::new(dest.clone());

    match source.scheme() {
        Scheme::Http | Scheme::Https => {
            download_http(&state.http, source.as_str(), &dest).await?
        }
        Scheme::S3 => {
            let (bucket, key) = source.s3_parts()?;
            state.storage.download_to(&bucket, &key, &dest).await?;
        }
    }

    info!("⬇️ Acquired {} -> {}", source.as_str(), dest.display());
    Ok(AcquiredSource::Local(guard))
}

/// Streaming HTTP(S) download.
pub async fn download_http(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), JobError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| JobError::Download(e.to_string()))?
        .error_for_status()
        .map_err(|e| JobError::Download(e.to_string()))?;

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| JobError::Download(e.to_string()))?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn local_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.tif");
        std::fs::write(&path, b"bytes").unwrap();

        {
            let _guard = LocalFile::new(path.clone());
        }

        assert!(!path.exists());
    }

    #[test]
    fn dropping_a_guard_for_a_missing_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let _guard = LocalFile::new(dir.path().join("never-created.tif"));
    }

    #[tokio::test]
    async fn http_download_writes_body_to_dest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/scene.tif"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tiff-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("scene.tif");
        let client = reqwest::Client::new();

        download_http(&client, &format!("{}/data/scene.tif", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"tiff-bytes");
    }

    #[tokio::test]
    async fn http_error_status_fails_without_creating_a_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.tif"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.tif");
        let client = reqwest::Client::new();

        let result = download_http(&client, &format!("{}/missing.tif", server.uri()), &dest).await;

        assert!(matches!(result, Err(JobError::Download(_))));
        assert!(!dest.exists());
    }
}

//! Source ingestion: remote URLs and upload buffers to local temp files.
//!
//! Every fetched source lands in a [`SourceHandle`] that owns a temp file
//! under the configured directory. The file is deleted when the handle drops.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use vscan_models::settings::is_supported_format;

use crate::error::{MediaError, MediaResult};

/// Prefix of every temp file created for a source.
pub const TEMP_FILE_PREFIX: &str = "vscan-";

/// A video to analyze, before ingestion.
#[derive(Clone)]
pub enum VideoSource {
    Url(String),
    Upload { filename: String, data: Vec<u8> },
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            VideoSource::Upload { filename, data } => f
                .debug_struct("Upload")
                .field("filename", filename)
                .field("size_bytes", &data.len())
                .finish(),
        }
    }
}

/// A local, decodable copy of a source. Deletes its file on drop.
#[derive(Debug)]
pub struct SourceHandle {
    path: TempPath,
    size_bytes: u64,
}

impl SourceHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// Turns a [`VideoSource`] into a local file.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &VideoSource) -> MediaResult<SourceHandle>;
}

/// Check an upload before it is accepted.
pub fn validate_upload(filename: &str, size_bytes: u64, max_bytes: u64) -> MediaResult<()> {
    if !is_supported_format(filename) {
        return Err(MediaError::UnsupportedFormat(filename.to_string()));
    }
    if size_bytes > max_bytes {
        return Err(MediaError::SourceTooLarge {
            size: size_bytes,
            limit: max_bytes,
        });
    }
    Ok(())
}

/// Check that a URL is absolute http(s).
pub fn validate_url(raw: &str) -> MediaResult<url::Url> {
    let parsed = url::Url::parse(raw).map_err(|e| MediaError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(MediaError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            other
        ))),
    }
}

/// Fetches sources over HTTP and persists uploads, enforcing a byte limit.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    temp_dir: PathBuf,
    max_bytes: u64,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(temp_dir: impl Into<PathBuf>, max_bytes: u64, timeout_secs: u64) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MediaError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            temp_dir: temp_dir.into(),
            max_bytes,
            timeout_secs,
        })
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    async fn create_temp(&self, suffix: &str) -> MediaResult<TempPath> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let file = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.temp_dir)?;
        Ok(file.into_temp_path())
    }

    fn map_request_error(&self, e: reqwest::Error) -> MediaError {
        if e.is_timeout() {
            MediaError::Timeout(self.timeout_secs)
        } else {
            MediaError::download_failed(e.to_string())
        }
    }

    fn check_size(&self, size: u64) -> MediaResult<()> {
        if size > self.max_bytes {
            return Err(MediaError::SourceTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    async fn download(&self, raw_url: &str) -> MediaResult<SourceHandle> {
        let url = validate_url(raw_url)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            return Err(MediaError::download_failed(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        if let Some(length) = response.content_length() {
            self.check_size(length)?;
        }

        let path = self.create_temp(&url_suffix(&url)).await?;
        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_request_error(e))?;
            written += chunk.len() as u64;
            // Content-Length may be absent or wrong
            self.check_size(written)?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!(url = %url, bytes = written, "Downloaded source");

        Ok(SourceHandle {
            path,
            size_bytes: written,
        })
    }

    async fn persist_upload(&self, filename: &str, data: &[u8]) -> MediaResult<SourceHandle> {
        validate_upload(filename, data.len() as u64, self.max_bytes)?;

        let suffix = Path::new(filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let path = self.create_temp(&suffix).await?;
        tokio::fs::write(&path, data).await?;

        debug!(filename, bytes = data.len(), path = %path.display(), "Persisted upload");

        Ok(SourceHandle {
            path,
            size_bytes: data.len() as u64,
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &VideoSource) -> MediaResult<SourceHandle> {
        match source {
            VideoSource::Url(url) => self.download(url).await,
            VideoSource::Upload { filename, data } => self.persist_upload(filename, data).await,
        }
    }
}

/// Keep a supported extension from the URL path so FFmpeg can guess the container.
fn url_suffix(url: &url::Url) -> String {
    let path = url.path();
    if is_supported_format(path) {
        if let Some(ext) = Path::new(path).extension() {
            return format!(".{}", ext.to_string_lossy().to_lowercase());
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(dir: &Path, max_bytes: u64) -> HttpFetcher {
        HttpFetcher::new(dir, max_bytes, 5).unwrap()
    }

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload("clip.mp4", 10, 100).is_ok());
        assert!(matches!(
            validate_upload("clip.mp4", 101, 100),
            Err(MediaError::SourceTooLarge { size: 101, limit: 100 })
        ));
        assert!(matches!(
            validate_upload("clip.gif", 10, 100),
            Err(MediaError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/a.mp4").is_ok());
        assert!(validate_url("ftp://example.com/a.mp4").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_upload_is_deleted_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(dir.path(), 1024);

        let handle = fetcher
            .fetch(&VideoSource::Upload {
                filename: "clip.MP4".into(),
                data: vec![1, 2, 3],
            })
            .await
            .unwrap();

        let path = handle.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(handle.size_bytes(), 3);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(TEMP_FILE_PREFIX));
        assert!(name.ends_with(".mp4"));

        drop(handle);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_download_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let handle = fetcher(dir.path(), 1024)
            .fetch(&VideoSource::Url(format!("{}/video.mp4", server.uri())))
            .await
            .unwrap();

        assert_eq!(handle.size_bytes(), 64);
        assert_eq!(std::fs::read(handle.path()).unwrap(), vec![7u8; 64]);
    }

    #[tokio::test]
    async fn test_download_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(dir.path(), 1024)
            .fetch(&VideoSource::Url(format!("{}/big.mp4", server.uri())))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::SourceTooLarge { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_http_error_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(dir.path(), 1024)
            .fetch(&VideoSource::Url(format!("{}/missing.mp4", server.uri())))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), vscan_models::ErrorKind::SourceUnreachable);
    }
}

// ─── Remote File Store ───
// Seam to the update source: fetch raw file content and decoded
// manifest/catalog documents by remote path.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::manifest::Manifest;
use crate::core::mods::ModCatalog;

/// Chunked remote file content.
pub type ByteStream = BoxStream<'static, LauncherResult<Vec<u8>>>;

/// The remote file store the launcher synchronizes against.
///
/// Implementations only have to provide [`fetch_file`]; the decoded
/// document fetches are built on top of it.
///
/// [`fetch_file`]: RemoteSource::fetch_file
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Stream the raw content of a remote file.
    async fn fetch_file(&self, path: &str) -> LauncherResult<ByteStream>;

    /// Fetch and decode a patch manifest document.
    async fn fetch_manifest(&self, path: &str) -> LauncherResult<Manifest> {
        let bytes = read_all(self.fetch_file(path).await?).await?;
        let manifest: Manifest = serde_json::from_slice(&bytes)?;
        debug!("Fetched manifest {path}: {} files", manifest.files.len());
        Ok(manifest)
    }

    /// Fetch and decode the advertised mod catalog.
    async fn fetch_catalog(&self, path: &str) -> LauncherResult<ModCatalog> {
        let bytes = read_all(self.fetch_file(path).await?).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Collect a byte stream into memory. Only used for small JSON
/// documents; file content is streamed to disk by the patcher.
async fn read_all(mut stream: ByteStream) -> LauncherResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    Ok(bytes)
}

/// HTTP-backed remote source rooted at a base URL.
pub struct HttpRemoteSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteSource {
    pub fn new(base_url: impl Into<String>) -> LauncherResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch_file(&self, path: &str) -> LauncherResult<ByteStream> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(LauncherError::from))
            .boxed())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory remote source shared by the module tests.

    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    pub struct FakeRemote {
        files: HashMap<String, Vec<u8>>,
        fail_on: Option<String>,
    }

    impl FakeRemote {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
            self.files.insert(path.to_string(), content.to_vec());
            self
        }

        pub fn with_json(self, path: &str, value: &serde_json::Value) -> Self {
            let bytes = serde_json::to_vec(value).unwrap();
            self.with_file(path, &bytes)
        }

        /// Make every fetch of `path` fail with a transport error.
        pub fn failing_on(mut self, path: &str) -> Self {
            self.fail_on = Some(path.to_string());
            self
        }
    }

    #[async_trait]
    impl RemoteSource for FakeRemote {
        async fn fetch_file(&self, path: &str) -> LauncherResult<ByteStream> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(LauncherError::DownloadFailed {
                    url: path.to_string(),
                    status: 500,
                });
            }
            let content = self.files.get(path).cloned().ok_or_else(|| {
                LauncherError::DownloadFailed {
                    url: path.to_string(),
                    status: 404,
                }
            })?;
            // Two chunks, so stream consumers see more than one read.
            let mid = content.len() / 2;
            let chunks: Vec<LauncherResult<Vec<u8>>> = vec![
                Ok(content[..mid].to_vec()),
                Ok(content[mid..].to_vec()),
            ];
            Ok(futures_util::stream::iter(chunks).boxed())
        }
    }
}

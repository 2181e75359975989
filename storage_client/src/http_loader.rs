use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use blob::{Blob, BlobError, StreamSource};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use http::header::{ACCEPT, CONTENT_TYPE};
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use crate::error::{Result, StorageError};
use crate::interface::Loader;

/// Read-only loader fetching sources over HTTP(S).
///
/// Policy checks (host whitelist, scheme) run before any network activity;
/// the request itself is deferred into the returned blob's opener so the
/// fan-out memoizer dedups the download across sniffing, persistence and
/// processing.
pub struct HttpLoader {
    client: reqwest::Client,
    allowed_sources: Vec<String>,
    max_allowed_size: Option<u64>,
    default_scheme: Option<String>,
    accept: Option<String>,
}

impl Default for HttpLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            allowed_sources: Vec::new(),
            max_allowed_size: None,
            default_scheme: Some("https".to_string()),
            accept: None,
        }
    }

    /// Comma-separated glob patterns of allowed hosts. An empty list admits
    /// every host.
    pub fn with_allowed_sources(mut self, sources: &str) -> Self {
        self.allowed_sources = sources
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    pub fn with_max_allowed_size(mut self, max: u64) -> Self {
        self.max_allowed_size = (max > 0).then_some(max);
        self
    }

    /// Scheme applied to references without one. `"nil"` disables the
    /// default, making scheme-less references invalid.
    pub fn with_default_scheme(mut self, scheme: &str) -> Self {
        self.default_scheme = match scheme {
            "nil" => None,
            s => Some(s.trim_end_matches("://").to_string()),
        };
        self
    }

    /// Accept header sent upstream; the response Content-Type is validated
    /// against the same list.
    pub fn with_accept(mut self, accept: &str) -> Self {
        self.accept = (!accept.is_empty() && accept != "*/*").then(|| accept.to_string());
        self
    }

    fn normalize(&self, key: &str) -> Result<Url> {
        let key = key.trim_start_matches('/');
        let raw = if key.contains("://") {
            key.to_string()
        } else {
            match &self.default_scheme {
                Some(scheme) => format!("{scheme}://{key}"),
                None => return Err(StorageError::BadSource(key.to_string())),
            }
        };
        let url = Url::parse(&raw).map_err(|e| StorageError::BadSource(format!("{key}: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(StorageError::BadSource(key.to_string()));
        }
        Ok(url)
    }

    fn source_allowed(&self, url: &Url) -> bool {
        if self.allowed_sources.is_empty() {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.allowed_sources.iter().any(|pattern| glob_match(pattern, host))
    }
}

#[async_trait::async_trait]
impl Loader for HttpLoader {
    async fn get(&self, key: &str) -> Result<Blob> {
        let url = self.normalize(key)?;
        if !self.source_allowed(&url) {
            // A host outside the whitelist is treated as absent; no network
            // call is made.
            debug!(%url, "source host not in whitelist");
            return Err(StorageError::NotFound);
        }

        let client = self.client.clone();
        let accept = self.accept.clone();
        let max_allowed_size = self.max_allowed_size;
        let fetch = Arc::new(move || {
            let client = client.clone();
            let accept = accept.clone();
            let url = url.clone();
            async move { fetch_stream(client, url, accept, max_allowed_size).await }
        });

        Ok(Blob::new(move || {
            let fetch = fetch.clone();
            async move { fetch().await }
        }))
    }
}

async fn fetch_stream(
    client: reqwest::Client,
    url: Url,
    accept: Option<String>,
    max_allowed_size: Option<u64>,
) -> blob::Result<(StreamSource, Option<u64>)> {
    let mut request = client.get(url.clone());
    if let Some(accept) = &accept {
        request = request.header(ACCEPT, accept);
    }
    let response = request
        .send()
        .await
        .map_err(|e| BlobError::Io(Arc::new(std::io::Error::other(e))))?;

    let status = response.status();
    if status == http::StatusCode::NOT_FOUND {
        return Err(BlobError::NotFound);
    }
    if !status.is_success() {
        return Err(BlobError::UpstreamStatus(status.as_u16()));
    }

    // Reject early when the upstream declares an oversize body; the cap is
    // enforced again on the actual byte count below, since a chunked response
    // carries no length and a dishonest one may understate it.
    if let (Some(max), Some(len)) = (max_allowed_size, response.content_length()) {
        if len > max {
            return Err(BlobError::SizeExceeded { got: len, max });
        }
    }

    if let Some(accept) = &accept {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !accepts_content_type(accept, &content_type) {
            return Err(BlobError::UnsupportedFormat(content_type));
        }
    }

    let size = response.content_length();
    let stream = response.bytes_stream().map_err(std::io::Error::other).boxed();
    let reader: StreamSource = match max_allowed_size {
        Some(max) => Box::new(StreamReader::new(SizeCappedStream::new(stream, max))),
        None => Box::new(StreamReader::new(stream)),
    };
    Ok((reader, size))
}

/// Counts bytes as the body streams and errors once the cap is exceeded, so
/// the max-allowed-size policy holds even without an honest Content-Length.
struct SizeCappedStream {
    inner: BoxStream<'static, std::io::Result<Bytes>>,
    max: u64,
    seen: u64,
}

impl SizeCappedStream {
    fn new(inner: BoxStream<'static, std::io::Result<Bytes>>, max: u64) -> Self {
        Self { inner, max, seen: 0 }
    }
}

impl Stream for SizeCappedStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                self.seen += bytes.len() as u64;
                if self.seen > self.max {
                    Poll::Ready(Some(Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("allowed size exceeded: {} > {}", self.seen, self.max),
                    ))))
                } else {
                    Poll::Ready(Some(Ok(bytes)))
                }
            },
            other => other,
        }
    }
}

/// Match a host against a glob pattern where `*` spans any run of characters.
fn glob_match(pattern: &str, host: &str) -> bool {
    let pattern = pattern.as_bytes();
    let host = host.as_bytes();
    let (mut p, mut h) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while h < host.len() {
        if p < pattern.len() && (pattern[p] == host[h]) {
            p += 1;
            h += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, h));
            p += 1;
        } else if let Some((sp, sh)) = star {
            p = sp + 1;
            h = sh + 1;
            star = Some((sp, sh + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

/// Match a Content-Type against a comma-separated accept list with `type/*`
/// wildcards.
fn accepts_content_type(accept: &str, content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    if mime.is_empty() {
        // An upstream that does not declare a type is given the benefit of
        // the doubt; sniffing decides downstream.
        return true;
    }
    accept.split(',').map(str::trim).any(|pattern| {
        if pattern == "*/*" {
            return true;
        }
        match pattern.strip_suffix("/*") {
            Some(prefix) => mime.split('/').next() == Some(prefix),
            None => pattern.eq_ignore_ascii_case(mime),
        }
    })
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const JPEG_HEADER: &[u8] = b"\xFF\xD8\xFF\xE0 payload";

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*.example.com", "cdn.example.com"));
        assert!(glob_match("*.example.com", "a.b.example.com"));
        assert!(!glob_match("*.example.com", "example.com"));
        assert!(glob_match("example.*", "example.org"));
        assert!(glob_match("*", "anything.at.all"));
        assert!(!glob_match("cdn.example.com", "cdn2.example.com"));
    }

    #[test]
    fn test_accepts_content_type() {
        assert!(accepts_content_type("image/*", "image/png"));
        assert!(accepts_content_type("image/*,application/pdf", "application/pdf"));
        assert!(!accepts_content_type("image/*", "text/html"));
        assert!(accepts_content_type("image/jpeg", "image/jpeg; charset=binary"));
        assert!(accepts_content_type("image/*", ""));
    }

    async fn mock_image_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/demo.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(JPEG_HEADER)
                    .insert_header("content-type", "image/jpeg"),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = mock_image_server().await;
        let loader = HttpLoader::new();

        let blob = loader.get(&format!("{}/demo.jpg", server.uri())).await.unwrap();
        assert!(blob.err().await.is_none());
        assert_eq!(blob.read_all().await.unwrap(), JPEG_HEADER);
        assert_eq!(blob.blob_type().await, blob::BlobType::Jpeg);
    }

    #[tokio::test]
    async fn test_upstream_404_latches_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = HttpLoader::new();
        let blob = loader.get(&format!("{}/missing.jpg", server.uri())).await.unwrap();
        assert!(matches!(blob.err().await, Some(BlobError::NotFound)));
    }

    #[tokio::test]
    async fn test_disallowed_host_short_circuits() {
        let server = mock_image_server().await;
        let loader = HttpLoader::new().with_allowed_sources("*.trusted.example");

        let result = loader.get(&format!("{}/demo.jpg", server.uri())).await;
        assert!(matches!(result, Err(StorageError::NotFound)));
        // No request reached the server.
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_max_allowed_size_from_header() {
        let server = mock_image_server().await;
        let loader = HttpLoader::new().with_max_allowed_size(4);

        let blob = loader.get(&format!("{}/demo.jpg", server.uri())).await.unwrap();
        assert!(matches!(blob.err().await, Some(BlobError::SizeExceeded { .. })));
    }

    #[tokio::test]
    async fn test_max_allowed_size_enforced_while_streaming() {
        use tokio::io::AsyncReadExt;

        // No Content-Length to pre-check: the cap must trip on the bytes
        // actually received.
        let chunks: Vec<std::io::Result<Bytes>> = (0..4).map(|_| Ok(Bytes::from(vec![7u8; 4096]))).collect();
        let stream = futures::stream::iter(chunks).boxed();
        let mut reader = StreamReader::new(SizeCappedStream::new(stream, 10_000));

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        // Everything under the cap was still delivered before the error.
        assert_eq!(out.len(), 8192);

        // A body within the cap streams through untouched.
        let chunks: Vec<std::io::Result<Bytes>> = (0..4).map(|_| Ok(Bytes::from(vec![7u8; 1024]))).collect();
        let stream = futures::stream::iter(chunks).boxed();
        let mut reader = StreamReader::new(SizeCappedStream::new(stream, 10_000));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 4096);
    }

    #[tokio::test]
    async fn test_accept_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let loader = HttpLoader::new().with_accept("image/*");
        let blob = loader.get(&format!("{}/page.html", server.uri())).await.unwrap();
        assert!(matches!(blob.err().await, Some(BlobError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_default_scheme_applied() {
        let loader = HttpLoader::new();
        assert_eq!(loader.normalize("example.com/a.jpg").unwrap().scheme(), "https");
        assert_eq!(loader.normalize("http://example.com/a.jpg").unwrap().scheme(), "http");

        let loader = HttpLoader::new().with_default_scheme("nil");
        assert!(matches!(
            loader.normalize("example.com/a.jpg"),
            Err(StorageError::BadSource(_))
        ));
    }

    #[tokio::test]
    async fn test_single_download_across_readers() {
        let server = mock_image_server().await;
        let loader = HttpLoader::new();

        let blob = loader.get(&format!("{}/demo.jpg", server.uri())).await.unwrap();
        for _ in 0..3 {
            assert_eq!(blob.read_all().await.unwrap(), JPEG_HEADER);
        }
        // The fan-out memoizer kept it to one upstream request.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}

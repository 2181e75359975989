use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek};
use tokio::sync::{Mutex, OnceCell};

use crate::error::{BlobError, Result};
use crate::fanout::Fanout;
pub use crate::fanout::StreamSource;

/// Sources larger than this are never materialized through the fan-out
/// buffer; seeking such a blob requires a natively seekable source.
pub const MAX_MEMORY_SIZE: u64 = 100 << 20;

const SNIFF_LEN: usize = 512;

/// Content class detected from a blob's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobType {
    Unknown,
    Empty,
    Json,
    Jpeg,
    Png,
    Gif,
    Webp,
    Avif,
    Heif,
    Tiff,
}

/// Combined read + seek trait object bound.
pub trait AsyncReadSeek: AsyncRead + AsyncSeek {}
impl<T: AsyncRead + AsyncSeek + ?Sized> AsyncReadSeek for T {}

pub type SeekableSource = Box<dyn AsyncReadSeek + Send + Unpin>;

type Opener = Arc<dyn Fn() -> BoxFuture<'static, Result<(StreamSource, Option<u64>)>> + Send + Sync>;
type SeekOpener = Arc<dyn Fn() -> BoxFuture<'static, Result<(SeekableSource, u64)>> + Send + Sync>;

/// Validation predicate run against a file's metadata at construction.
pub type FileCheck = Box<dyn Fn(&std::fs::Metadata) -> Result<()> + Send + Sync>;

struct Sniffed {
    blob_type: BlobType,
    content_type: String,
    size: Option<u64>,
    prefix: Bytes,
    err: Option<BlobError>,
}

/// A lazily-read, typed, multiply-consumable byte container.
///
/// The underlying source is opened at most once for sniffing; the first 512
/// bytes classify the blob and are re-buffered so the first reader observes
/// the stream from the start. Sources constructed from an opener function are
/// memoized through a [`Fanout`] when their size is known and below
/// [`MAX_MEMORY_SIZE`], so any number of readers and seekers share one
/// upstream read.
pub struct Blob {
    opener: RwLock<Option<Opener>>,
    seek_opener: RwLock<Option<SeekOpener>>,
    fanout: bool,
    file_path: Option<PathBuf>,
    construct_err: Option<BlobError>,
    preset_type: Option<BlobType>,
    preset_content_type: Option<String>,
    content_type_override: RwLock<Option<String>>,
    known_size: Option<u64>,
    sniffed: OnceCell<Sniffed>,
    peek: Mutex<Option<StreamSource>>,
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("file_path", &self.file_path)
            .field("known_size", &self.known_size)
            .field("sniffed", &self.sniffed.get().map(|s| s.blob_type))
            .finish()
    }
}

impl Blob {
    fn base() -> Self {
        Self {
            opener: RwLock::new(None),
            seek_opener: RwLock::new(None),
            fanout: false,
            file_path: None,
            construct_err: None,
            preset_type: None,
            preset_content_type: None,
            content_type_override: RwLock::new(None),
            known_size: None,
            sniffed: OnceCell::new(),
            peek: Mutex::new(None),
        }
    }

    /// Blob over an arbitrary producer function. The function is invoked
    /// lazily; once the size is known the fan-out memoizer is wired so
    /// subsequent readers and seekers share a single upstream read.
    pub fn new<F, Fut>(opener: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(StreamSource, Option<u64>)>> + Send + 'static,
    {
        let mut blob = Self::base();
        blob.fanout = true;
        blob.opener = RwLock::new(Some(Arc::new(move || Box::pin(opener()))));
        blob
    }

    /// Blob over a file path. The file is stat'ed eagerly; a missing file
    /// latches the not-found error, and each validation predicate may latch
    /// its own.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self::from_file_with_checks(path, Vec::new())
    }

    pub fn from_file_with_checks(path: impl AsRef<Path>, checks: Vec<FileCheck>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut blob = Self::base();
        blob.fanout = true;
        blob.file_path = Some(path.clone());

        match std::fs::metadata(&path) {
            Err(e) => {
                blob.construct_err = Some(BlobError::from(e));
            },
            Ok(meta) => {
                if let Some(err) = checks.iter().find_map(|check| check(&meta).err()) {
                    blob.construct_err = Some(err);
                }
                blob.known_size = Some(meta.len());
                let size = meta.len();
                let open_path = path.clone();
                blob.opener = RwLock::new(Some(Arc::new(move || {
                    let path = open_path.clone();
                    Box::pin(async move {
                        let file = tokio::fs::File::open(&path).await?;
                        Ok((Box::new(file) as StreamSource, Some(size)))
                    })
                })));
                let seek_path = path;
                blob.seek_opener = RwLock::new(Some(Arc::new(move || {
                    let path = seek_path.clone();
                    Box::pin(async move {
                        let file = tokio::fs::File::open(&path).await?;
                        Ok((Box::new(file) as SeekableSource, size))
                    })
                })));
            },
        }
        blob
    }

    /// Blob over an in-memory byte slice. Slices are already shareable, so
    /// fan-out stays disabled and every reader is a fresh cursor.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let mut blob = Self::base();
        blob.known_size = Some(data.len() as u64);
        blob.install_cursor_openers(data);
        blob
    }

    /// Blob holding the JSON serialization of a value; type and content-type
    /// are pre-set.
    pub fn from_json<T: Serialize>(value: &T) -> Self {
        let mut blob = Self::base();
        blob.preset_type = Some(BlobType::Json);
        blob.preset_content_type = Some("application/json".to_string());
        match serde_json::to_vec(value) {
            Ok(buf) => {
                blob.known_size = Some(buf.len() as u64);
                blob.install_cursor_openers(Bytes::from(buf));
            },
            Err(e) => {
                blob.construct_err = Some(BlobError::Serialization(e.to_string()));
            },
        }
        blob
    }

    /// Blob with no content. No opener is ever invoked.
    pub fn empty() -> Self {
        Self::base()
    }

    fn install_cursor_openers(&mut self, data: Bytes) {
        let size = data.len() as u64;
        let read_data = data.clone();
        self.opener = RwLock::new(Some(Arc::new(move || {
            let data = read_data.clone();
            Box::pin(async move { Ok((Box::new(std::io::Cursor::new(data)) as StreamSource, Some(size))) })
        })));
        self.seek_opener = RwLock::new(Some(Arc::new(move || {
            let data = data.clone();
            Box::pin(async move { Ok((Box::new(std::io::Cursor::new(data)) as SeekableSource, size)) })
        })));
    }

    async fn sniffed(&self) -> &Sniffed {
        self.sniffed.get_or_init(|| self.do_sniff()).await
    }

    async fn do_sniff(&self) -> Sniffed {
        if let Some(err) = &self.construct_err {
            return Sniffed {
                blob_type: self.preset_type.unwrap_or(BlobType::Unknown),
                content_type: self.preset_content_type.clone().unwrap_or_default(),
                size: self.known_size,
                prefix: Bytes::new(),
                err: Some(err.clone()),
            };
        }

        let opener = self.opener.read().unwrap().clone();
        let Some(opener) = opener else {
            return Sniffed {
                blob_type: BlobType::Empty,
                content_type: detect_content_type(b"").to_string(),
                size: Some(0),
                prefix: Bytes::new(),
                err: None,
            };
        };

        let (mut reader, size) = match opener().await {
            Ok(opened) => opened,
            Err(e) => {
                return Sniffed {
                    blob_type: BlobType::Unknown,
                    content_type: String::new(),
                    size: self.known_size,
                    prefix: Bytes::new(),
                    err: Some(e),
                };
            },
        };
        let size = size.or(self.known_size);

        // Memoize through the fan-out buffer so every later reader shares
        // this one upstream read. Natively seekable sources keep their own
        // seek opener; otherwise seek is simulated over the buffer.
        if self.fanout {
            if let Some(sz) = size.filter(|&sz| sz > 0 && sz < MAX_MEMORY_SIZE) {
                let fanout = Arc::new(Fanout::new(reader, sz as usize));
                reader = Box::new(fanout.new_reader());

                let reader_fanout = fanout.clone();
                *self.opener.write().unwrap() = Some(Arc::new(move || {
                    let fanout = reader_fanout.clone();
                    Box::pin(async move {
                        let size = fanout.size() as u64;
                        Ok((Box::new(fanout.new_reader()) as StreamSource, Some(size)))
                    })
                }));

                let mut seek_opener = self.seek_opener.write().unwrap();
                if seek_opener.is_none() {
                    *seek_opener = Some(Arc::new(move || {
                        let fanout = fanout.clone();
                        Box::pin(async move {
                            let size = fanout.size() as u64;
                            Ok((Box::new(fanout.new_reader()) as SeekableSource, size))
                        })
                    }));
                }
            }
        }

        // Peek the leading bytes for type sniffing.
        let mut prefix = vec![0u8; SNIFF_LEN];
        let mut filled = 0;
        let mut err = None;
        loop {
            match reader.read(&mut prefix[filled..]).await {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled == SNIFF_LEN {
                        break;
                    }
                },
                Err(e) => {
                    err = Some(BlobError::from(e));
                    break;
                },
            }
        }
        prefix.truncate(filled);
        let prefix = Bytes::from(prefix);

        let blob_type = match self.preset_type {
            Some(preset) => preset,
            None if prefix.is_empty() => BlobType::Empty,
            None => classify(&prefix),
        };
        let size = match blob_type {
            BlobType::Empty => Some(size.unwrap_or(0)),
            _ => size,
        };

        if err.is_none() {
            // Re-buffer the peeked prefix so the first reader is seamless.
            let chained: StreamSource = Box::new(std::io::Cursor::new(prefix.clone()).chain(reader));
            *self.peek.lock().await = Some(chained);
        }

        let content_type = match &self.preset_content_type {
            Some(preset) => preset.clone(),
            None => match content_type_for(blob_type) {
                Some(ct) => ct.to_string(),
                None => detect_content_type(&prefix).to_string(),
            },
        };

        Sniffed {
            blob_type,
            content_type,
            size,
            prefix,
            err,
        }
    }

    pub async fn blob_type(&self) -> BlobType {
        self.sniffed().await.blob_type
    }

    pub async fn is_empty(&self) -> bool {
        self.sniffed().await.blob_type == BlobType::Empty
    }

    pub async fn supports_animation(&self) -> bool {
        matches!(self.sniffed().await.blob_type, BlobType::Gif | BlobType::Webp)
    }

    /// The sniffed prefix, at most 512 bytes. Does not consume readable bytes.
    pub async fn sniff(&self) -> Bytes {
        self.sniffed().await.prefix.clone()
    }

    pub async fn size(&self) -> Option<u64> {
        self.sniffed().await.size
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Override the content type. Only effective before first consumption.
    pub fn set_content_type(&self, content_type: impl Into<String>) {
        *self.content_type_override.write().unwrap() = Some(content_type.into());
    }

    pub async fn content_type(&self) -> String {
        if let Some(ct) = self.content_type_override.read().unwrap().clone() {
            return ct;
        }
        self.sniffed().await.content_type.clone()
    }

    pub async fn err(&self) -> Option<BlobError> {
        self.sniffed().await.err.clone()
    }

    /// A fresh read handle over the full content. The first call after
    /// sniffing returns the peek-buffered reader so no upstream bytes are
    /// lost; later calls go through the (possibly fan-out memoized) opener.
    pub async fn new_reader(&self) -> Result<(StreamSource, Option<u64>)> {
        let sniffed = self.sniffed().await;
        if let Some(e) = &sniffed.err {
            return Err(e.clone());
        }
        if let Some(peek) = self.peek.lock().await.take() {
            return Ok((peek, sniffed.size));
        }
        let opener = self.opener.read().unwrap().clone();
        match opener {
            Some(opener) => {
                let (reader, size) = opener().await?;
                Ok((reader, size.or(sniffed.size)))
            },
            None => Ok((Box::new(std::io::Cursor::new(Bytes::new())), Some(0))),
        }
    }

    /// A read handle supporting seek: the native seeker when the source has
    /// one, a fan-out materialized view when the content fits in memory, and
    /// method-not-allowed otherwise.
    pub async fn new_read_seeker(&self) -> Result<(SeekableSource, u64)> {
        let sniffed = self.sniffed().await;
        if let Some(e) = &sniffed.err {
            return Err(e.clone());
        }
        let seek_opener = self.seek_opener.read().unwrap().clone();
        match seek_opener {
            Some(opener) => opener().await,
            None => Err(BlobError::MethodNotAllowed),
        }
    }

    /// The full content as a byte vector; empty for [`BlobType::Empty`].
    pub async fn read_all(&self) -> Result<Vec<u8>> {
        let sniffed = self.sniffed().await;
        if sniffed.blob_type == BlobType::Empty {
            return match &sniffed.err {
                Some(e) => Err(e.clone()),
                None => Ok(Vec::new()),
            };
        }
        let (mut reader, size) = self.new_reader().await?;
        let mut out = Vec::with_capacity(size.unwrap_or(0) as usize);
        reader.read_to_end(&mut out).await?;
        Ok(out)
    }
}

fn classify(buf: &[u8]) -> BlobType {
    if buf.len() >= 3 && buf[..3] == *b"\xFF\xD8\xFF" {
        BlobType::Jpeg
    } else if buf.len() >= 4 && buf[..4] == *b"\x89PNG" {
        BlobType::Png
    } else if buf.len() >= 3 && buf[..3] == *b"GIF" {
        BlobType::Gif
    } else if buf.len() >= 12 && buf[8..12] == *b"WEBP" {
        BlobType::Webp
    } else if buf.len() >= 12 && buf[4..8] == *b"ftyp" && buf[8..12] == *b"avif" {
        BlobType::Avif
    } else if buf.len() >= 12
        && buf[4..8] == *b"ftyp"
        && (buf[8..12] == *b"heic" || buf[8..12] == *b"mif1" || buf[8..12] == *b"msf1")
    {
        BlobType::Heif
    } else if buf.len() >= 4 && (buf[..4] == *b"II*\0" || buf[..4] == *b"MM\0*") {
        BlobType::Tiff
    } else {
        BlobType::Unknown
    }
}

fn content_type_for(blob_type: BlobType) -> Option<&'static str> {
    match blob_type {
        BlobType::Json => Some("application/json"),
        BlobType::Jpeg => Some("image/jpeg"),
        BlobType::Png => Some("image/png"),
        BlobType::Gif => Some("image/gif"),
        BlobType::Webp => Some("image/webp"),
        BlobType::Avif => Some("image/avif"),
        BlobType::Heif => Some("image/heif"),
        BlobType::Tiff => Some("image/tiff"),
        BlobType::Unknown | BlobType::Empty => None,
    }
}

/// Fallback MIME detection over the sniff buffer for blobs no magic number
/// matched.
fn detect_content_type(buf: &[u8]) -> &'static str {
    if buf.starts_with(b"%PDF-") {
        "application/pdf"
    } else if buf.starts_with(b"<?xml") {
        "text/xml; charset=utf-8"
    } else if std::str::from_utf8(buf).is_ok() {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::io::AsyncSeekExt;

    use super::*;

    fn jpeg_bytes() -> Vec<u8> {
        let mut buf = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01];
        buf.extend_from_slice(&[0u8; 100]);
        buf
    }

    fn ftyp_bytes(brand: &[u8; 4]) -> Vec<u8> {
        let mut buf = vec![0u8; 24];
        buf[4..8].copy_from_slice(b"ftyp");
        buf[8..12].copy_from_slice(brand);
        buf
    }

    #[tokio::test]
    async fn test_jpeg_sniff() {
        let blob = Blob::from_bytes(vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01,
        ]);
        assert_eq!(blob.blob_type().await, BlobType::Jpeg);
        assert_eq!(blob.content_type().await, "image/jpeg");
        assert!(!blob.supports_animation().await);
    }

    #[tokio::test]
    async fn test_avif_and_heif_detection() {
        assert_eq!(Blob::from_bytes(ftyp_bytes(b"avif")).blob_type().await, BlobType::Avif);
        for brand in [b"heic", b"mif1", b"msf1"] {
            let blob = Blob::from_bytes(ftyp_bytes(brand));
            assert_eq!(blob.blob_type().await, BlobType::Heif);
            assert_eq!(blob.content_type().await, "image/heif");
        }
    }

    #[tokio::test]
    async fn test_magic_table() {
        let cases: Vec<(Vec<u8>, BlobType, &str, bool)> = vec![
            (b"\x89PNG\r\n\x1a\n........".to_vec(), BlobType::Png, "image/png", false),
            (b"GIF89a..........".to_vec(), BlobType::Gif, "image/gif", true),
            (b"RIFF\x00\x00\x00\x00WEBPVP8 ".to_vec(), BlobType::Webp, "image/webp", true),
            (b"II*\0................".to_vec(), BlobType::Tiff, "image/tiff", false),
            (b"MM\0*................".to_vec(), BlobType::Tiff, "image/tiff", false),
        ];
        for (bytes, expected, content_type, animated) in cases {
            let blob = Blob::from_bytes(bytes);
            assert_eq!(blob.blob_type().await, expected);
            assert_eq!(blob.content_type().await, content_type);
            assert_eq!(blob.supports_animation().await, animated);
        }
    }

    #[tokio::test]
    async fn test_sniff_is_idempotent() {
        let blob = Blob::from_bytes(jpeg_bytes());
        let first = (blob.blob_type().await, blob.content_type().await, blob.size().await);
        let sniff = blob.sniff().await;
        for _ in 0..3 {
            assert_eq!((blob.blob_type().await, blob.content_type().await, blob.size().await), first);
            assert_eq!(blob.sniff().await, sniff);
        }
        // Sniffing consumed no readable bytes.
        assert_eq!(blob.read_all().await.unwrap(), jpeg_bytes());
    }

    #[tokio::test]
    async fn test_bytes_roundtrip() {
        let data = b"hello world".to_vec();
        let blob = Blob::from_bytes(data.clone());
        assert_eq!(blob.read_all().await.unwrap(), data);
        assert_eq!(blob.size().await, Some(data.len() as u64));
        assert_eq!(blob.blob_type().await, BlobType::Unknown);
        assert_eq!(blob.content_type().await, "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_reader_equivalence() {
        let data = jpeg_bytes();
        let blob = Blob::from_bytes(data.clone());
        let all = blob.read_all().await.unwrap();

        let (mut reader, size) = blob.new_reader().await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, all);
        assert_eq!(size, Some(data.len() as u64));

        let (mut seeker, size) = blob.new_read_seeker().await.unwrap();
        assert_eq!(size, data.len() as u64);
        seeker.seek(std::io::SeekFrom::Start(2)).await.unwrap();
        let mut out = Vec::new();
        seeker.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, &data[2..]);
    }

    #[tokio::test]
    async fn test_empty_blob() {
        for blob in [Blob::empty(), Blob::from_bytes(Vec::new())] {
            assert_eq!(blob.blob_type().await, BlobType::Empty);
            assert!(blob.is_empty().await);
            assert!(blob.sniff().await.is_empty());
            assert_eq!(blob.size().await, Some(0));
            assert!(blob.err().await.is_none());
            assert!(blob.read_all().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_json_blob() {
        let blob = Blob::from_json(&serde_json::json!({"foo": "bar"}));
        assert_eq!(blob.blob_type().await, BlobType::Json);
        assert_eq!(blob.content_type().await, "application/json");
        assert_eq!(blob.read_all().await.unwrap(), br#"{"foo":"bar"}"#);
        assert_eq!(blob.sniff().await, br#"{"foo":"bar"}"#.as_slice());
    }

    #[tokio::test]
    async fn test_content_type_override() {
        let blob = Blob::from_bytes(jpeg_bytes());
        blob.set_content_type("foo/bar");
        assert_eq!(blob.blob_type().await, BlobType::Jpeg);
        assert_eq!(blob.content_type().await, "foo/bar");
    }

    #[tokio::test]
    async fn test_file_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.jpg");
        std::fs::write(&path, jpeg_bytes()).unwrap();

        let blob = Blob::from_file(&path);
        assert_eq!(blob.blob_type().await, BlobType::Jpeg);
        assert_eq!(blob.file_path(), Some(path.as_path()));
        assert_eq!(blob.size().await, Some(jpeg_bytes().len() as u64));
        assert!(blob.err().await.is_none());
        assert_eq!(blob.read_all().await.unwrap(), jpeg_bytes());

        // A second reader starts from the beginning.
        let (mut reader, _) = blob.new_reader().await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, jpeg_bytes());
    }

    #[tokio::test]
    async fn test_missing_file_latches_not_found() {
        let blob = Blob::from_file("/definitely/not/here.jpg");
        assert!(matches!(blob.err().await, Some(BlobError::NotFound)));
        assert!(matches!(blob.read_all().await, Err(BlobError::NotFound)));
        assert!(matches!(blob.new_reader().await, Err(BlobError::NotFound)));
    }

    #[tokio::test]
    async fn test_file_check_failure_latches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();

        let check: FileCheck = Box::new(|meta| {
            if meta.len() > 100 {
                Err(BlobError::Validation("file too large".to_string()))
            } else {
                Ok(())
            }
        });
        let blob = Blob::from_file_with_checks(&path, vec![check]);
        assert!(matches!(blob.err().await, Some(BlobError::Validation(_))));
    }

    #[tokio::test]
    async fn test_opener_blob_shares_one_upstream_read() {
        let opens = Arc::new(AtomicU32::new(0));
        let data = jpeg_bytes();
        let opens_ = opens.clone();
        let data_ = data.clone();
        let blob = Blob::new(move || {
            let opens = opens_.clone();
            let data = data_.clone();
            async move {
                opens.fetch_add(1, Ordering::SeqCst);
                let len = data.len() as u64;
                Ok((Box::new(std::io::Cursor::new(data)) as StreamSource, Some(len)))
            }
        });

        assert_eq!(blob.blob_type().await, BlobType::Jpeg);
        for _ in 0..4 {
            assert_eq!(blob.read_all().await.unwrap(), data);
        }
        // The fan-out memoizer means the opener ran exactly once.
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_opener_blob_simulates_seek() {
        let data = jpeg_bytes();
        let data_ = data.clone();
        let blob = Blob::new(move || {
            let data = data_.clone();
            async move {
                let len = data.len() as u64;
                Ok((Box::new(std::io::Cursor::new(data)) as StreamSource, Some(len)))
            }
        });

        let (mut seeker, size) = blob.new_read_seeker().await.unwrap();
        assert_eq!(size, data.len() as u64);
        seeker.seek(std::io::SeekFrom::Start(3)).await.unwrap();
        let mut out = Vec::new();
        seeker.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, &data[3..]);
    }

    #[tokio::test]
    async fn test_unknown_size_disables_seek() {
        let blob = Blob::new(|| async {
            Ok((Box::new(std::io::Cursor::new(b"streaming".to_vec())) as StreamSource, None))
        });
        assert_eq!(blob.read_all().await.unwrap(), b"streaming");
        assert!(matches!(blob.new_read_seeker().await, Err(BlobError::MethodNotAllowed)));
    }
}

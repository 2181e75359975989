use std::fmt;
use std::sync::Arc;

use blob::{Blob, BlobError};
use storage_client::StorageError;
use thiserror::Error;
use utils::singleflight::SingleflightError;

/// Which deadline fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    Request,
    Load,
    Process,
    Save,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            TimeoutPhase::Request => "request",
            TimeoutPhase::Load => "load",
            TimeoutPhase::Process => "process",
            TimeoutPhase::Save => "save",
        };
        f.write_str(phase)
    }
}

/// Request-level error kinds, each with a stable code and HTTP status.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum PictorError {
    #[error("not found")]
    NotFound,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("unauthorized")]
    Unauthorized,

    #[error("expired")]
    Expired,

    #[error("{0} timeout")]
    Timeout(TimeoutPhase),

    #[error("bad source: {0}")]
    BadSource(String),

    #[error("unsupported format")]
    UnsupportedFormat,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("internal error: {0}")]
    Internal(String),

    /// The processor failed but produced a partial artifact (e.g. an error
    /// image); the artifact is served with the failure's status code.
    #[error("{source}")]
    ProcessorFallback {
        source: Box<PictorError>,
        blob: Arc<Blob>,
    },
}

pub type Result<T> = std::result::Result<T, PictorError>;

impl PictorError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PictorError::NotFound => "not-found",
            PictorError::SignatureMismatch => "signature-mismatch",
            PictorError::Unauthorized => "unauthorized",
            PictorError::Expired => "expired",
            PictorError::Timeout(_) => "timeout",
            PictorError::BadSource(_) => "bad-source",
            PictorError::UnsupportedFormat => "unsupported-format",
            PictorError::MethodNotAllowed => "method-not-allowed",
            PictorError::Internal(_) => "internal",
            PictorError::ProcessorFallback { source, .. } => source.code(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            PictorError::NotFound => 404,
            PictorError::SignatureMismatch => 403,
            PictorError::Unauthorized => 401,
            PictorError::Expired => 410,
            PictorError::Timeout(_) => 408,
            PictorError::BadSource(_) => 403,
            PictorError::UnsupportedFormat => 415,
            PictorError::MethodNotAllowed => 405,
            PictorError::Internal(_) => 500,
            PictorError::ProcessorFallback { source, .. } => source.status_code(),
        }
    }
}

impl From<BlobError> for PictorError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound => PictorError::NotFound,
            BlobError::MethodNotAllowed => PictorError::MethodNotAllowed,
            BlobError::UpstreamStatus(401) | BlobError::UpstreamStatus(403) => PictorError::Unauthorized,
            BlobError::UpstreamStatus(404) => PictorError::NotFound,
            BlobError::UpstreamStatus(status) => PictorError::BadSource(format!("upstream status {status}")),
            BlobError::SizeExceeded { got, max } => {
                PictorError::BadSource(format!("allowed size exceeded: {got} > {max}"))
            },
            BlobError::UnsupportedFormat(_) => PictorError::UnsupportedFormat,
            BlobError::Validation(msg) => PictorError::BadSource(msg),
            BlobError::Io(e) => PictorError::Internal(e.to_string()),
            BlobError::Serialization(msg) => PictorError::Internal(msg),
            other => PictorError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for PictorError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => PictorError::NotFound,
            StorageError::Expired => PictorError::Expired,
            StorageError::BadSource(msg) => PictorError::BadSource(msg),
            StorageError::Blob(e) => e.into(),
            StorageError::Io(e) => PictorError::Internal(e.to_string()),
            StorageError::Other(msg) => PictorError::Internal(msg),
            other => PictorError::Internal(other.to_string()),
        }
    }
}

// Owners get their error back verbatim; abnormal waiter outcomes collapse to
// internal.
impl From<SingleflightError<PictorError>> for PictorError {
    fn from(err: SingleflightError<PictorError>) -> Self {
        match err {
            SingleflightError::InternalError(e) => e,
            other => PictorError::Internal(format!("{other}")),
        }
    }
}

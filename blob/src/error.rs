use std::sync::Arc;

use thiserror::Error;

/// Errors latched onto a [`crate::Blob`] or returned by its readers.
///
/// Cloneable so a latched error can be surfaced by every subsequent query;
/// the sniff path and every reader request observe the same value.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum BlobError {
    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("allowed size exceeded: {got} > {max}")]
    SizeExceeded { got: u64, max: u64 },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, BlobError>;

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            BlobError::NotFound
        } else {
            BlobError::Io(Arc::new(err))
        }
    }
}

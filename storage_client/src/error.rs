use std::sync::Arc;

use blob::BlobError;
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("expired")]
    Expired,

    #[error("invalid source reference: {0}")]
    BadSource(String),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound
        } else {
            StorageError::Io(Arc::new(err))
        }
    }
}

use std::time::SystemTime;

use blob::Blob;

use crate::error::Result;

/// Lightweight metadata about a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// A read-only source fetch capability identified by reference.
///
/// Implementations return a [`Blob`] whose content may still be streaming;
/// transport errors encountered after `get` returns are latched onto the blob
/// and observed at first consumption. A missing entry is `NotFound`, which a
/// loader chain treats as "try the next loader".
#[async_trait::async_trait]
pub trait Loader: Send + Sync {
    async fn get(&self, key: &str) -> Result<Blob>;
}

/// A read/write/stat/delete capability used for source persistence or result
/// caching.
#[async_trait::async_trait]
pub trait Storage: Loader {
    async fn put(&self, key: &str, blob: &Blob) -> Result<()>;

    async fn stat(&self, key: &str) -> Result<Stat>;

    async fn delete(&self, key: &str) -> Result<()>;
}

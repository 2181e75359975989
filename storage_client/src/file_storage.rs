use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use blob::Blob;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::interface::{Loader, Stat, Storage};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Loader + storage over a local directory tree.
///
/// Keys map onto paths under `base_dir` after the configured path prefix is
/// stripped; keys escaping the base directory are rejected. Writes go through
/// a temporary file and a rename so readers never observe a partial entry.
pub struct FileStorage {
    base_dir: PathBuf,
    path_prefix: String,
    expiration: Option<Duration>,
}

impl FileStorage {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            path_prefix: String::new(),
            expiration: None,
        }
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = (expiration > Duration::ZERO).then_some(expiration);
        self
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let key = key.trim_start_matches('/');
        let key = if self.path_prefix.is_empty() {
            key
        } else {
            match key.strip_prefix(&self.path_prefix) {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
                // Keys outside the configured namespace are simply absent.
                _ => return Err(StorageError::NotFound),
            }
        };
        if key.is_empty() {
            return Err(StorageError::NotFound);
        }
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::BadSource(key.to_string()));
        }
        Ok(self.base_dir.join(relative))
    }

    fn check_expiration(&self, meta: &std::fs::Metadata) -> Result<()> {
        if let (Some(expiration), Ok(modified)) = (self.expiration, meta.modified()) {
            if modified + expiration < SystemTime::now() {
                return Err(StorageError::Expired);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Loader for FileStorage {
    async fn get(&self, key: &str) -> Result<Blob> {
        let path = self.resolve(key)?;
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(StorageError::NotFound);
        }
        self.check_expiration(&meta)?;
        Ok(Blob::from_file(path))
    }
}

#[async_trait::async_trait]
impl Storage for FileStorage {
    async fn put(&self, key: &str, blob: &Blob) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stage into a sibling temp file, then rename into place.
        let tmp = path.with_extension(format!(
            "tmp.{}.{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let (mut reader, _) = blob.new_reader().await?;
        let mut file = tokio::fs::File::create(&tmp).await?;
        let copied = tokio::io::copy(&mut reader, &mut file).await;
        match copied {
            Ok(written) => {
                file.sync_all().await?;
                drop(file);
                tokio::fs::rename(&tmp, &path).await?;
                debug!(key, written, "stored file entry");
                Ok(())
            },
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e.into())
            },
        }
    }

    async fn stat(&self, key: &str) -> Result<Stat> {
        let path = self.resolve(key)?;
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(StorageError::NotFound);
        }
        self.check_expiration(&meta)?;
        Ok(Stat {
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use blob::BlobType;

    use super::*;

    fn storage() -> (tempfile::TempDir, FileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_put_get_stat_delete() {
        let (_dir, storage) = storage();
        let data = b"\xFF\xD8\xFF\xE0 jpeg-ish payload".to_vec();

        storage.put("a/b/demo.jpg", &Blob::from_bytes(data.clone())).await.unwrap();

        let blob = storage.get("a/b/demo.jpg").await.unwrap();
        assert_eq!(blob.blob_type().await, BlobType::Jpeg);
        assert_eq!(blob.read_all().await.unwrap(), data);

        let stat = storage.stat("a/b/demo.jpg").await.unwrap();
        assert_eq!(stat.size, data.len() as u64);
        assert!(stat.modified.is_some());

        storage.delete("a/b/demo.jpg").await.unwrap();
        assert!(matches!(storage.get("a/b/demo.jpg").await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn test_missing_entry_is_not_found() {
        let (_dir, storage) = storage();
        assert!(matches!(storage.get("nope.png").await, Err(StorageError::NotFound)));
        assert!(matches!(storage.stat("nope.png").await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.get("../../etc/passwd").await,
            Err(StorageError::BadSource(_))
        ));
        assert!(matches!(storage.get("a/../../b").await, Err(StorageError::BadSource(_))));
    }

    #[tokio::test]
    async fn test_path_prefix_scopes_namespace() {
        let (_dir, storage) = storage();
        let storage = storage.with_path_prefix("/imgs/");

        storage.put("imgs/x.png", &Blob::from_bytes(b"data".to_vec())).await.unwrap();
        assert!(storage.get("imgs/x.png").await.is_ok());
        assert!(matches!(storage.get("other/x.png").await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn test_expiration() {
        let (_dir, storage) = storage();
        let storage = storage.with_expiration(Duration::from_millis(50));

        storage.put("x.png", &Blob::from_bytes(b"data".to_vec())).await.unwrap();
        assert!(storage.get("x.png").await.is_ok());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(matches!(storage.get("x.png").await, Err(StorageError::Expired)));
        assert!(matches!(storage.stat("x.png").await, Err(StorageError::Expired)));
    }
}

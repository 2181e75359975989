use std::path::PathBuf;
use std::time::Duration;

crate::config_group!(file_storage {
    /// Base directory for file source storage. The file storage backend is
    /// enabled only when this is set.
    ///
    /// Use the environment variable `PICTOR_FILE_STORAGE_BASE_DIR` to set this value.
    base_dir: Option<PathBuf> = None;

    /// Base directory for a read-only file loader distinct from the storage
    /// directory.
    ///
    /// Use the environment variable `PICTOR_FILE_STORAGE_LOADER_BASE_DIR` to set this value.
    loader_base_dir: Option<PathBuf> = None;

    /// Path prefix stripped from keys before they are mapped onto the base
    /// directory.
    ///
    /// Use the environment variable `PICTOR_FILE_STORAGE_PATH_PREFIX` to set this value.
    path_prefix: String = String::new();

    /// Stored entries older than this are treated as expired on read.
    /// Zero disables expiration.
    ///
    /// Use the environment variable `PICTOR_FILE_STORAGE_EXPIRATION` to set this value.
    expiration: Duration = Duration::ZERO;
});

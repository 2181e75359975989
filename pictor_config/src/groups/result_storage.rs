use std::path::PathBuf;
use std::time::Duration;

crate::config_group!(result_storage {
    /// Base directory for file result storage. The result store is enabled
    /// only when this is set.
    ///
    /// Use the environment variable `PICTOR_RESULT_STORAGE_BASE_DIR` to set this value.
    base_dir: Option<PathBuf> = None;

    /// Path prefix applied to result keys.
    ///
    /// Use the environment variable `PICTOR_RESULT_STORAGE_PATH_PREFIX` to set this value.
    path_prefix: String = String::new();

    /// Stored results older than this are treated as expired on read.
    /// Zero disables expiration.
    ///
    /// Use the environment variable `PICTOR_RESULT_STORAGE_EXPIRATION` to set this value.
    expiration: Duration = Duration::ZERO;
});

crate::config_group!(log {
    /// Default tracing filter directive, overridable per-process with RUST_LOG.
    ///
    /// Use the environment variable `PICTOR_LOG_LEVEL` to set this value.
    level: String = "info".to_string();
});

crate::config_group!(http_loader {
    /// Disable the HTTP loader entirely.
    ///
    /// Use the environment variable `PICTOR_HTTP_LOADER_DISABLE` to set this value.
    disable: bool = false;

    /// Comma-separated host glob whitelist, e.g. "*.example.com,cdn.foo.io".
    /// An empty list allows every host.
    ///
    /// Use the environment variable `PICTOR_HTTP_LOADER_ALLOWED_SOURCES` to set this value.
    allowed_sources: Option<String> = None;

    /// Maximum allowed response size in bytes. 0 disables the cap.
    ///
    /// Use the environment variable `PICTOR_HTTP_LOADER_MAX_ALLOWED_SIZE` to set this value.
    max_allowed_size: u64 = 0;

    /// Scheme applied to source references that carry none. Set to "nil" to
    /// disable the default scheme.
    ///
    /// Use the environment variable `PICTOR_HTTP_LOADER_DEFAULT_SCHEME` to set this value.
    default_scheme: String = "https".to_string();

    /// Accept header sent upstream and validated against the response
    /// Content-Type.
    ///
    /// Use the environment variable `PICTOR_HTTP_LOADER_ACCEPT` to set this value.
    accept: String = "image/*".to_string();
});

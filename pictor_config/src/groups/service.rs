use std::time::Duration;

crate::config_group!(service {
    /// Overall budget for serving one request, covering load, process and store.
    ///
    /// Use the environment variable `PICTOR_SERVICE_REQUEST_TIMEOUT` to set this value.
    request_timeout: Duration = Duration::from_secs(30);

    /// Budget for the loader chain. Should be smaller than the request timeout.
    ///
    /// Use the environment variable `PICTOR_SERVICE_LOAD_TIMEOUT` to set this value.
    load_timeout: Duration = Duration::from_secs(20);

    /// Budget for persisting a source or result artifact to storage.
    ///
    /// Use the environment variable `PICTOR_SERVICE_SAVE_TIMEOUT` to set this value.
    save_timeout: Duration = Duration::from_secs(20);

    /// Budget for a single processor invocation.
    ///
    /// Use the environment variable `PICTOR_SERVICE_PROCESS_TIMEOUT` to set this value.
    process_timeout: Duration = Duration::from_secs(20);

    /// Size of the semaphore bounding concurrent processor invocations.
    /// Set to -1 to disable the gate entirely.
    ///
    /// Use the environment variable `PICTOR_SERVICE_PROCESS_CONCURRENCY` to set this value.
    process_concurrency: i64 = -1;

    /// Cache-Control max-age applied to successful image responses.
    ///
    /// Use the environment variable `PICTOR_SERVICE_CACHE_HEADER_TTL` to set this value.
    cache_header_ttl: Duration = Duration::from_secs(7 * 24 * 3600);

    /// Cache-Control stale-while-revalidate applied to successful image responses.
    ///
    /// Use the environment variable `PICTOR_SERVICE_CACHE_HEADER_SWR` to set this value.
    cache_header_swr: Duration = Duration::from_secs(24 * 3600);

    /// Emit `no-cache` headers instead of the TTL pair.
    ///
    /// Use the environment variable `PICTOR_SERVICE_CACHE_HEADER_NO_CACHE` to set this value.
    cache_header_no_cache: bool = false;

    /// Negotiate WebP output automatically when the client accepts it.
    ///
    /// Use the environment variable `PICTOR_SERVICE_AUTO_WEBP` to set this value.
    auto_webp: bool = false;

    /// Negotiate AVIF output automatically when the client accepts it.
    ///
    /// Use the environment variable `PICTOR_SERVICE_AUTO_AVIF` to set this value.
    auto_avif: bool = false;

    /// Compare the stored result's modification time against the source before
    /// treating a result-store probe as a hit. Eliminates stale results at the
    /// cost of extra stat calls.
    ///
    /// Use the environment variable `PICTOR_SERVICE_MODIFIED_TIME_CHECK` to set this value.
    modified_time_check: bool = false;

    /// Suppress JSON error bodies; respond with the status code only.
    ///
    /// Use the environment variable `PICTOR_SERVICE_DISABLE_ERROR_BODY` to set this value.
    disable_error_body: bool = false;

    /// Disable the /params/<spec> introspection endpoint.
    ///
    /// Use the environment variable `PICTOR_SERVICE_DISABLE_PARAMS_ENDPOINT` to set this value.
    disable_params_endpoint: bool = false;

    /// Redirect target for the bare `/` path. When unset, `/` returns 404.
    ///
    /// Use the environment variable `PICTOR_SERVICE_BASE_PATH_REDIRECT` to set this value.
    base_path_redirect: Option<String> = None;

    /// Spec fragment prepended to every request spec, e.g.
    /// "filters:watermark(example.jpg)/".
    ///
    /// Use the environment variable `PICTOR_SERVICE_BASE_PARAMS` to set this value.
    base_params: Option<String> = None;

    /// Accept the literal `unsafe` token in place of a signature. Prone to URL
    /// tampering; intended for development.
    ///
    /// Use the environment variable `PICTOR_SERVICE_ALLOW_UNSAFE` to set this value.
    allow_unsafe: bool = false;
});

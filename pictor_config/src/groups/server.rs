crate::config_group!(server {
    /// Network interface to bind to.
    ///
    /// Use the environment variable `PICTOR_SERVER_HOST` to set this value.
    host: String = "0.0.0.0".to_string();

    /// TCP port for the HTTP server.
    ///
    /// Use the environment variable `PICTOR_SERVER_PORT` to set this value.
    port: u16 = 8000;

    /// Enable permissive CORS headers.
    ///
    /// Use the environment variable `PICTOR_SERVER_CORS` to set this value.
    cors: bool = false;

    /// Path prefix stripped from incoming request paths.
    ///
    /// Use the environment variable `PICTOR_SERVER_PATH_PREFIX` to set this value.
    path_prefix: String = String::new();
});

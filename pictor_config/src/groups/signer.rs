crate::config_group!(signer {
    /// Secret key for signing request URLs.
    ///
    /// Use the environment variable `PICTOR_SIGNER_SECRET` to set this value.
    secret: String = String::new();

    /// URL signature hash algorithm: sha1, sha256 or sha512.
    ///
    /// Use the environment variable `PICTOR_SIGNER_SIGNER_TYPE` to set this value.
    signer_type: String = "sha1".to_string();

    /// Truncate the signature to this many characters. 0 keeps the full digest.
    ///
    /// Use the environment variable `PICTOR_SIGNER_TRUNCATE` to set this value.
    truncate: usize = 0;
});

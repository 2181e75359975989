use lazy_static::lazy_static;

use crate::groups;

/// Primary configuration struct containing all config sections.
#[derive(Debug, Clone, Default)]
pub struct PictorConfig {
    pub service: groups::service::ConfigValues,
    pub signer: groups::signer::ConfigValues,
    pub http_loader: groups::http_loader::ConfigValues,
    pub file_storage: groups::file_storage::ConfigValues,
    pub result_storage: groups::result_storage::ConfigValues,
    pub server: groups::server::ConfigValues,
    pub log: groups::log::ConfigValues,
}

impl PictorConfig {
    /// Create a new PictorConfig instance with default values and apply
    /// environment variable overrides. Equivalent to
    /// `PictorConfig::default().with_env_overrides()`.
    pub fn new() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment variable overrides to all configuration sections.
    /// The group name for each section is derived from its module name.
    /// Environment variables follow the pattern: PICTOR_{GROUP_NAME}_{FIELD_NAME}
    pub fn with_env_overrides(mut self) -> Self {
        self.service.apply_env_overrides();
        self.signer.apply_env_overrides();
        self.http_loader.apply_env_overrides();
        self.file_storage.apply_env_overrides();
        self.result_storage.apply_env_overrides();
        self.server.apply_env_overrides();
        self.log.apply_env_overrides();
        self
    }
}

lazy_static! {
    static ref GLOBAL_CONFIG: PictorConfig = PictorConfig::new();
}

/// Process-wide configuration snapshot, read once from the environment.
pub fn pictor_config() -> &'static PictorConfig {
    &GLOBAL_CONFIG
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = PictorConfig::default();
        assert_eq!(config.service.request_timeout, Duration::from_secs(30));
        assert_eq!(config.service.process_concurrency, -1);
        assert_eq!(config.signer.signer_type, "sha1");
        assert_eq!(config.http_loader.default_scheme, "https");
        assert_eq!(config.server.port, 8000);
        assert!(!config.service.allow_unsafe);
    }

    #[test]
    fn test_env_override() {
        // Serialized by the fact that cargo runs tests in one process per
        // crate; the variable is removed before the function returns.
        std::env::set_var("PICTOR_SERVICE_REQUEST_TIMEOUT", "5s");
        std::env::set_var("PICTOR_SERVER_PORT", "9000");
        let config = PictorConfig::default().with_env_overrides();
        std::env::remove_var("PICTOR_SERVICE_REQUEST_TIMEOUT");
        std::env::remove_var("PICTOR_SERVER_PORT");

        assert_eq!(config.service.request_timeout, Duration::from_secs(5));
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_alias_env_override() {
        std::env::set_var("PICTOR_SECRET", "alias-secret");
        let config = PictorConfig::default().with_env_overrides();
        std::env::remove_var("PICTOR_SECRET");

        assert_eq!(config.signer.secret, "alias-secret");
    }

    #[test]
    fn test_env_names() {
        assert_eq!(
            groups::service::ConfigValues::env_name("request_timeout"),
            "PICTOR_SERVICE_REQUEST_TIMEOUT"
        );
        assert_eq!(
            groups::http_loader::ConfigValues::env_name("max_allowed_size"),
            "PICTOR_HTTP_LOADER_MAX_ALLOWED_SIZE"
        );
    }
}

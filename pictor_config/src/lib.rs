mod aliases;
pub use aliases::ENVIRONMENT_NAME_ALIASES;

pub mod macros;
pub mod pictor_config;

pub mod groups;

// Re-exported for use inside the config_group! macro expansion.
pub use utils::configuration_utils::ParsableConfigValue;

pub use crate::pictor_config::{PictorConfig, pictor_config};

pub type ServiceConfig = groups::service::ConfigValues;
pub type SignerConfig = groups::signer::ConfigValues;
pub type HttpLoaderConfig = groups::http_loader::ConfigValues;
pub type FileStorageConfig = groups::file_storage::ConfigValues;
pub type ResultStorageConfig = groups::result_storage::ConfigValues;
pub type ServerConfig = groups::server::ConfigValues;
pub type LogConfig = groups::log::ConfigValues;

pub mod configuration_utils;
pub mod singleflight;

pub use configuration_utils::ParsableConfigValue;

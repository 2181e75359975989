use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Parse a configuration value from an optional environment string, falling
/// back to the supplied default when the variable is absent or malformed.
///
/// Implemented for the value types used by the `config_group!` macro in
/// `pictor_config`. A malformed value logs a warning and keeps the default
/// rather than aborting startup.
pub trait ParsableConfigValue: Sized {
    fn parse(name: &str, value: Option<String>, default: Self) -> Self;
}

fn warn_malformed(name: &str, raw: &str, expected: &str) {
    warn!("ignoring malformed config value {name}={raw:?}; expected {expected}");
}

impl ParsableConfigValue for bool {
    fn parse(name: &str, value: Option<String>, default: Self) -> Self {
        match value {
            None => default,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    warn_malformed(name, &raw, "a boolean");
                    default
                },
            },
        }
    }
}

macro_rules! impl_parse_from_str {
    ($($t:ty => $expected:literal;)+) => {
        $(
            impl ParsableConfigValue for $t {
                fn parse(name: &str, value: Option<String>, default: Self) -> Self {
                    match value {
                        None => default,
                        Some(raw) => match raw.trim().parse::<$t>() {
                            Ok(v) => v,
                            Err(_) => {
                                warn_malformed(name, &raw, $expected);
                                default
                            },
                        },
                    }
                }
            }
        )+
    };
}

impl_parse_from_str! {
    usize => "an unsigned integer";
    u16 => "an unsigned integer";
    u32 => "an unsigned integer";
    u64 => "an unsigned integer";
    i64 => "an integer";
    f64 => "a number";
}

impl ParsableConfigValue for String {
    fn parse(_name: &str, value: Option<String>, default: Self) -> Self {
        value.unwrap_or(default)
    }
}

impl ParsableConfigValue for Option<String> {
    fn parse(_name: &str, value: Option<String>, default: Self) -> Self {
        match value {
            Some(raw) if !raw.is_empty() => Some(raw),
            Some(_) => None,
            None => default,
        }
    }
}

impl ParsableConfigValue for PathBuf {
    fn parse(_name: &str, value: Option<String>, default: Self) -> Self {
        value.map(PathBuf::from).unwrap_or(default)
    }
}

impl ParsableConfigValue for Option<PathBuf> {
    fn parse(_name: &str, value: Option<String>, default: Self) -> Self {
        match value {
            Some(raw) if !raw.is_empty() => Some(PathBuf::from(raw)),
            Some(_) => None,
            None => default,
        }
    }
}

/// Durations accept the humantime grammar ("30s", "20m", "7days").
impl ParsableConfigValue for Duration {
    fn parse(name: &str, value: Option<String>, default: Self) -> Self {
        match value {
            None => default,
            Some(raw) => match humantime::parse_duration(raw.trim()) {
                Ok(v) => v,
                Err(_) => {
                    warn_malformed(name, &raw, "a duration such as \"30s\" or \"24h\"");
                    default
                },
            },
        }
    }
}

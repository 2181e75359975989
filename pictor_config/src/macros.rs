/// Declares one configuration group: a struct of typed values with defaults,
/// overridable from `PICTOR_{GROUP}_{FIELD}` environment variables.
///
/// ```rust
/// use std::time::Duration;
///
/// pictor_config::config_group!(demo {
///     /// How long to wait for upstream.
///     fetch_timeout: Duration = Duration::from_secs(10);
///     retries: usize = 3;
/// });
///
/// let mut values = ConfigValueGroup::default();
/// values.apply_env_overrides();
/// assert_eq!(ConfigValueGroup::env_name("retries"), "PICTOR_DEMO_RETRIES");
/// ```
///
/// The group name is spelled out at the call site so the variable names are
/// greppable next to the fields they configure. Lookup consults
/// [`crate::ENVIRONMENT_NAME_ALIASES`] when the primary variable is unset,
/// and a malformed value keeps the default (with a warning naming the exact
/// variable) rather than failing startup.
#[macro_export]
macro_rules! config_group {
    (
        $group:ident {
            $(
                $(#[$meta:meta])*
                $name:ident : $type:ty = $default:expr;
            )+
        }
    ) => {
        #[derive(Debug, Clone)]
        pub struct ConfigValueGroup {
            $(
                $(#[$meta])*
                pub $name: $type,
            )+
        }

        impl Default for ConfigValueGroup {
            fn default() -> Self {
                Self {
                    $(
                        $name: $default,
                    )+
                }
            }
        }

        impl ConfigValueGroup {
            /// The environment variable controlling `field` in this group.
            pub fn env_name(field: &str) -> String {
                format!(
                    "PICTOR_{}_{}",
                    stringify!($group).to_ascii_uppercase(),
                    field.to_ascii_uppercase()
                )
            }

            /// Overwrite each field from its environment variable, or an
            /// accepted alias, when one is set.
            pub fn apply_env_overrides(&mut self) {
                $(
                    {
                        let env_name = Self::env_name(stringify!($name));
                        let mut value = std::env::var(&env_name).ok();
                        if value.is_none() {
                            for &(primary, alias) in $crate::ENVIRONMENT_NAME_ALIASES {
                                if primary == env_name {
                                    value = std::env::var(alias).ok();
                                    if value.is_some() {
                                        break;
                                    }
                                }
                            }
                        }
                        let default: $type = $default;
                        self.$name = <$type as $crate::ParsableConfigValue>::parse(&env_name, value, default);
                    }
                )+
            }
        }

        /// Alias used by the aggregated configuration struct.
        pub type ConfigValues = ConfigValueGroup;
    };
}

/// Pairs of `(primary_env_var, accepted_alias)`. The alias is consulted only
/// when the primary variable is unset.
pub const ENVIRONMENT_NAME_ALIASES: &[(&str, &str)] = &[
    ("PICTOR_SIGNER_SECRET", "PICTOR_SECRET"),
    ("PICTOR_SERVICE_ALLOW_UNSAFE", "PICTOR_UNSAFE"),
];

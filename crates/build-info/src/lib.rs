//! Build provenance for the startup log: when the binary was compiled and
//! from which git revision.

/// UTC compile time, `YYYY-MM-DDTHH:MM:SSZ`.
pub const BUILT_AT: &str = match option_env!("LISTENER_BUILT_AT") {
    Some(value) => value,
    None => "unknown",
};

/// `git describe --tags --always --dirty`, or `unknown` outside a checkout.
pub const GIT_REVISION: &str = match option_env!("LISTENER_GIT_REVISION") {
    Some(value) => value,
    None => "unknown",
};

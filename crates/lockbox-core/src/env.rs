//! Environment variable handling.

use std::env;

/// Config file override.
pub const CONFIG_VAR: &str = "LOCKBOX_CONFIG";

/// Hex-encoded 32-byte master key for the file vault.
pub const MASTER_KEY_VAR: &str = "LOCKBOX_MASTER_KEY";

/// Process password applied to every operation of a store.
pub const PASSWORD_VAR: &str = "LOCKBOX_PASSWORD";

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable, keeping an explicitly empty value.
///
/// The process password distinguishes "unset" from "set to empty".
pub fn get_var_raw(name: &str) -> Option<String> {
    env::var(name).ok()
}

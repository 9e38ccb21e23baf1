//! Configuration schema definitions.

use crate::secret::SecretString;
use crate::types::{AccessPolicy, Accessibility};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default namespace (keychain "service") secrets are stored under.
pub const DEFAULT_NAMESPACE: &str = "lockbox";

/// Main Lockbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Namespace every secret of this store lives in.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Backend selection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Default access policy for writes.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            backend: BackendConfig::default(),
            policy: PolicyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Which native store backs the secret store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local map, lost on exit.
    Memory,
    /// Encrypted file vault.
    #[default]
    File,
    /// OS credential manager via the `keyring` crate.
    Keyring,
    /// Apple keychain with access control (macOS only).
    Keychain,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Keyring => "keyring",
            Self::Keychain => "keychain",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "keychain" => Ok(Self::Keychain),
            other => Err(format!(
                "unknown backend '{other}' (expected memory, file, keyring, keychain)"
            )),
        }
    }
}

/// Backend configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend variant.
    #[serde(default)]
    pub kind: BackendKind,

    /// Vault directory for the file backend (defaults to ~/.lockbox/vault).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_dir: Option<PathBuf>,

    /// Sharing groups this process is entitled to. Empty disables the check.
    #[serde(default)]
    pub access_groups: Vec<String>,
}

/// Default access policy section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Lock-state requirement.
    #[serde(default)]
    pub accessibility: Accessibility,

    /// Require a biometric challenge on each read.
    #[serde(default)]
    pub require_biometrics: bool,

    /// Default sharing group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharing_group: Option<String>,
}

impl PolicyConfig {
    /// Build the runtime policy, attaching the process password if any.
    pub fn to_policy(&self, password: Option<SecretString>) -> AccessPolicy {
        AccessPolicy {
            accessibility: self.accessibility,
            require_biometrics: self.require_biometrics,
            sharing_group: self.sharing_group.clone(),
            process_password: password,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

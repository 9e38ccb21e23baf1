//! Access policy: how a stored secret is protected.
//!
//! The unlock-state requirement and the biometric requirement are independent
//! axes. When biometrics are required the accessibility class still applies as
//! the storage-level protection underneath the per-read challenge.

use crate::error::PolicyError;
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device lock state under which a secret may be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// Readable only while the device is unlocked.
    #[default]
    WhenUnlocked,
    /// Readable after the first unlock following a restart.
    AfterFirstUnlock,
    /// Readable regardless of lock state.
    Always,
}

impl Accessibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhenUnlocked => "when_unlocked",
            Self::AfterFirstUnlock => "after_first_unlock",
            Self::Always => "always",
        }
    }
}

impl fmt::Display for Accessibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Accessibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "when_unlocked" | "when-unlocked" => Ok(Self::WhenUnlocked),
            "after_first_unlock" | "after-first-unlock" => Ok(Self::AfterFirstUnlock),
            "always" => Ok(Self::Always),
            other => Err(format!(
                "unknown accessibility '{other}' (expected when_unlocked, after_first_unlock, always)"
            )),
        }
    }
}

/// Protection requested for a secret at write time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Lock-state requirement.
    pub accessibility: Accessibility,

    /// Require a fresh biometric assertion on every read.
    pub require_biometrics: bool,

    /// Sharing (access) group the entry belongs to.
    pub sharing_group: Option<String>,

    /// Process-level password mixed into the protection.
    pub process_password: Option<SecretString>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn with_biometrics(mut self, require: bool) -> Self {
        self.require_biometrics = require;
        self
    }

    pub fn with_sharing_group(mut self, group: impl Into<String>) -> Self {
        self.sharing_group = Some(group.into());
        self
    }

    pub fn with_process_password(mut self, password: impl Into<SecretString>) -> Self {
        self.process_password = Some(password.into());
        self
    }

    /// Reject structurally malformed policies.
    ///
    /// Only the shape of the sharing group is checked here; whether the group
    /// is actually provisioned is up to the backend.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some(group) = &self.sharing_group {
            validate_sharing_group(group)?;
        }
        Ok(())
    }
}

/// Check that a sharing-group identifier is non-empty and printable.
pub fn validate_sharing_group(group: &str) -> Result<(), PolicyError> {
    if group.is_empty() {
        return Err(PolicyError::EmptySharingGroup);
    }
    if group.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(PolicyError::InvalidSharingGroup(group.to_string()));
    }
    Ok(())
}

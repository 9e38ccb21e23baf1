//! Biometric hardware capability reported by a backend probe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of biometric sensor the device can use for a challenge.
///
/// Probing never fails; any probe error is reported as [`BiometricCapability::None`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricCapability {
    /// No usable biometric sensor, or none enrolled.
    #[default]
    None,
    /// Fingerprint-class sensor.
    TouchEquivalent,
    /// Face-recognition-class sensor.
    FaceEquivalent,
}

impl BiometricCapability {
    /// Whether any biometric challenge is possible.
    pub fn is_available(self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::TouchEquivalent => "touch",
            Self::FaceEquivalent => "face",
        }
    }
}

impl fmt::Display for BiometricCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

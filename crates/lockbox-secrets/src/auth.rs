//! Biometric gate abstraction.
//!
//! The sensor and its prompt UI belong to the platform. Backends that gate
//! reads on biometrics in software (memory, file vault) talk to it through
//! [`Authenticator`]; the Apple keychain backend delegates to the OS instead.

use std::collections::VecDeque;

use lockbox_core::BiometricCapability;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::BackendError;

/// Prompt shown when the caller does not supply one.
pub const DEFAULT_PROMPT: &str = "Authenticate to access your secret";

/// Result of one biometric challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Approved,
    Failed,
    Canceled,
}

/// A blocking biometric challenge provider.
pub trait Authenticator: Send + Sync {
    /// Which sensor is available. Must not fail.
    fn capability(&self) -> BiometricCapability;

    /// Opaque token for the current enrollment set.
    ///
    /// Changes whenever a finger or face is added or removed. `None` means no
    /// enrollment exists and nothing can be bound to it.
    fn enrollment(&self) -> Option<String>;

    /// Present a challenge and block until the user responds.
    fn authenticate(&self, prompt: &str) -> AuthOutcome;
}

/// Run a challenge and translate the outcome into a backend status.
pub(crate) fn challenge(gate: &dyn Authenticator, prompt: &str) -> Result<(), BackendError> {
    match gate.authenticate(prompt) {
        AuthOutcome::Approved => Ok(()),
        AuthOutcome::Failed => Err(BackendError::auth_failed("biometric challenge failed")),
        AuthOutcome::Canceled => Err(BackendError::canceled()),
    }
}

/// Stable fingerprint of an enrollment token; the token itself is never persisted.
fn enrollment_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Capture the enrollment fingerprint an entry gets bound to at write time.
pub(crate) fn bind_enrollment(gate: Option<&dyn Authenticator>) -> Result<String, BackendError> {
    let gate = gate.ok_or_else(|| {
        BackendError::Unsupported("backend has no biometric authenticator".to_string())
    })?;
    if !gate.capability().is_available() {
        return Err(BackendError::AccessControl(
            "no biometric sensor available".to_string(),
        ));
    }
    gate.enrollment()
        .map(|token| enrollment_fingerprint(&token))
        .ok_or_else(|| BackendError::AccessControl("no biometric enrollment".to_string()))
}

/// Verify an entry's enrollment binding, then challenge.
pub(crate) fn verify_bound(
    gate: Option<&dyn Authenticator>,
    bound_to: &str,
    prompt: &str,
) -> Result<(), BackendError> {
    let gate = gate.ok_or_else(|| {
        BackendError::auth_failed("entry requires biometrics but no authenticator is configured")
    })?;
    let current = gate.enrollment().map(|token| enrollment_fingerprint(&token));
    if current.as_deref() != Some(bound_to) {
        debug!("biometric enrollment changed since the entry was written");
        return Err(BackendError::auth_failed("biometric enrollment changed"));
    }
    challenge(gate, prompt)
}

/// An [`Authenticator`] that answers from a script.
///
/// Queued outcomes are consumed first; after that every challenge gets the
/// fallback outcome. Useful in tests and for headless demos.
pub struct ScriptedAuthenticator {
    capability: BiometricCapability,
    enrollment: Mutex<Option<String>>,
    queued: Mutex<VecDeque<AuthOutcome>>,
    fallback: AuthOutcome,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAuthenticator {
    pub fn new(capability: BiometricCapability, fallback: AuthOutcome) -> Self {
        let enrollment = capability.is_available().then(|| "enrollment-1".to_string());
        Self {
            capability,
            enrollment: Mutex::new(enrollment),
            queued: Mutex::new(VecDeque::new()),
            fallback,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Approves every challenge.
    pub fn approving(capability: BiometricCapability) -> Self {
        Self::new(capability, AuthOutcome::Approved)
    }

    /// Fails every challenge.
    pub fn denying(capability: BiometricCapability) -> Self {
        Self::new(capability, AuthOutcome::Failed)
    }

    /// Cancels every challenge.
    pub fn canceling(capability: BiometricCapability) -> Self {
        Self::new(capability, AuthOutcome::Canceled)
    }

    /// Queue a one-shot outcome for the next challenge.
    pub fn push(&self, outcome: AuthOutcome) {
        self.queued.lock().push_back(outcome);
    }

    /// Replace the enrollment token, as if biometrics were re-enrolled.
    pub fn set_enrollment(&self, token: Option<&str>) {
        *self.enrollment.lock() = token.map(str::to_string);
    }

    /// Prompts shown so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn challenge_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

impl Authenticator for ScriptedAuthenticator {
    fn capability(&self) -> BiometricCapability {
        self.capability
    }

    fn enrollment(&self) -> Option<String> {
        self.enrollment.lock().clone()
    }

    fn authenticate(&self, prompt: &str) -> AuthOutcome {
        self.prompts.lock().push(prompt.to_string());
        self.queued.lock().pop_front().unwrap_or(self.fallback)
    }
}

//! Storage backends.
//!
//! A [`Backend`] is the native store a [`SecretStore`](crate::SecretStore)
//! delegates to. Backends speak in native status codes ([`BackendError`]);
//! translation into the public error taxonomy happens in the store.
//!
//! Available backends:
//!
//! - [`MemoryBackend`]: process-local, for tests and ephemeral use
//! - [`FileBackend`]: encrypted per-entry files under a vault directory
//! - [`KeyringBackend`]: the OS credential manager (feature `os-keyring`)
//! - [`AppleKeychainBackend`]: the Apple keychain with biometric access control (macOS)

use std::collections::BTreeSet;
use std::sync::Arc;

use lockbox_core::config::{BackendKind, Config};
use lockbox_core::{AccessPolicy, BiometricCapability};
use tracing::info;
use zeroize::Zeroizing;

use crate::auth::Authenticator;
use crate::error::{BackendError, Result, SecretError};
use crate::status;
use crate::types::StorageRequest;

#[cfg(target_os = "macos")]
mod apple;
mod file;
#[cfg(feature = "os-keyring")]
mod os_keyring;
mod memory;

#[cfg(target_os = "macos")]
pub use apple::{bundle_seed_id, AppleKeychainBackend};
pub use file::FileBackend;
#[cfg(feature = "os-keyring")]
pub use os_keyring::KeyringBackend;
pub use memory::MemoryBackend;

/// A native credential store.
///
/// Calls block the calling thread, including while a biometric prompt is on
/// screen. Implementations must be safe to share across threads; concurrent
/// writers of the same key race at the granularity of the native store.
///
/// On [`write`](Backend::write) the request carries the effective sharing
/// group and password; `policy` supplies accessibility and the biometric flag.
pub trait Backend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Create or replace the entry at `request.namespace`/`request.key`.
    fn write(
        &self,
        request: &StorageRequest<'_>,
        value: &[u8],
        policy: &AccessPolicy,
    ) -> std::result::Result<(), BackendError>;

    /// Read an entry's value, presenting a biometric challenge if it is gated.
    fn read(&self, request: &StorageRequest<'_>)
        -> std::result::Result<Zeroizing<Vec<u8>>, BackendError>;

    /// Remove one entry.
    fn erase(&self, request: &StorageRequest<'_>) -> std::result::Result<(), BackendError>;

    /// Remove every entry in a namespace. An empty namespace is not an error.
    fn erase_all(&self, namespace: &str) -> std::result::Result<(), BackendError>;

    /// Keys present in a namespace.
    ///
    /// May present one combined biometric challenge if gated entries exist.
    fn list_keys(
        &self,
        namespace: &str,
        prompt: Option<&str>,
    ) -> std::result::Result<BTreeSet<String>, BackendError>;

    /// Which biometric sensor can gate entries. Never fails.
    fn probe_biometrics(&self) -> BiometricCapability;
}

/// Sharing groups a process may write into.
///
/// An empty list disables the check, mirroring an unsigned developer build.
#[derive(Debug, Clone, Default)]
pub struct Entitlements {
    groups: Vec<String>,
}

impl Entitlements {
    pub fn new(groups: Vec<String>) -> Self {
        Self { groups }
    }

    /// Allow every group.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Fail with the missing-entitlement status if `group` is not allowed.
    pub fn check(&self, group: Option<&str>) -> std::result::Result<(), BackendError> {
        match group {
            Some(group) if !self.groups.is_empty() && !self.groups.iter().any(|g| g == group) => {
                Err(BackendError::status(
                    status::MISSING_ENTITLEMENT,
                    format!("process is not entitled to sharing group '{group}'"),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Check a lookup's sharing group against the group an entry was written with.
///
/// A lookup without a group matches any entry.
pub(crate) fn match_group(
    requested: Option<&str>,
    stored: Option<&str>,
) -> std::result::Result<(), BackendError> {
    match requested {
        Some(group) if stored != Some(group) => Err(BackendError::group_mismatch(format!(
            "entry is not visible in sharing group '{group}'"
        ))),
        _ => Ok(()),
    }
}

/// Build the backend selected by `config`.
///
/// `authenticator` gates biometric entries on the software backends; the
/// Apple keychain uses the OS prompt and ignores it.
pub fn open_backend(
    config: &Config,
    authenticator: Option<Arc<dyn Authenticator>>,
) -> Result<Arc<dyn Backend>> {
    let entitlements = Entitlements::new(config.backend.access_groups.clone());

    let backend: Arc<dyn Backend> = match config.backend.kind {
        BackendKind::Memory => {
            let mut backend = MemoryBackend::new().with_entitlements(entitlements);
            if let Some(gate) = authenticator {
                backend = backend.with_authenticator(gate);
            }
            Arc::new(backend)
        }
        BackendKind::File => {
            let dir = config
                .vault_dir()
                .map_err(|e| SecretError::InvalidArgument(e.to_string()))?;
            let master_key = crate::master_key::get_or_create_master_key(&config.namespace)?;
            let mut backend = FileBackend::new(dir, master_key).with_entitlements(entitlements);
            if let Some(gate) = authenticator {
                backend = backend.with_authenticator(gate);
            }
            Arc::new(backend)
        }
        BackendKind::Keyring => open_keyring()?,
        BackendKind::Keychain => open_keychain()?,
    };

    info!(backend = backend.name(), namespace = %config.namespace, "opened secret backend");
    Ok(backend)
}

#[cfg(feature = "os-keyring")]
fn open_keyring() -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(KeyringBackend::new()))
}

#[cfg(not(feature = "os-keyring"))]
fn open_keyring() -> Result<Arc<dyn Backend>> {
    Err(SecretError::BackendRejected {
        code: status::UNIMPLEMENTED,
        message: "built without the os-keyring feature".to_string(),
    })
}

#[cfg(target_os = "macos")]
fn open_keychain() -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(AppleKeychainBackend::new()))
}

#[cfg(not(target_os = "macos"))]
fn open_keychain() -> Result<Arc<dyn Backend>> {
    Err(SecretError::BackendRejected {
        code: status::UNIMPLEMENTED,
        message: "the Apple keychain backend is only available on macOS".to_string(),
    })
}

//! OS credential manager backend via the `keyring` crate.
//!
//! Entries map to generic credentials with service = namespace and
//! user = key. The credential managers behind `keyring` cannot enumerate by
//! service, so each namespace keeps an index credential listing its keys.
//! Biometric gating and sharing groups have no portable equivalent here and
//! are rejected as unsupported.

use std::collections::BTreeSet;

use keyring::Entry;
use lockbox_core::{AccessPolicy, BiometricCapability};
use parking_lot::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::Backend;
use crate::crypto;
use crate::error::BackendError;
use crate::status;
use crate::types::StorageRequest;

/// Account name of the per-namespace key index.
const INDEX_ACCOUNT: &str = "__lockbox_index__";

/// Stores entries in the platform credential manager.
#[derive(Debug, Default)]
pub struct KeyringBackend {
    /// Held across every load-modify-store of an index.
    index_lock: Mutex<()>,
}

impl KeyringBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(namespace: &str, key: &str) -> Result<Entry, BackendError> {
        Entry::new(namespace, key).map_err(|e| map_keyring_error(key, e))
    }

    fn load_index(namespace: &str) -> Result<BTreeSet<String>, BackendError> {
        match Self::entry(namespace, INDEX_ACCOUNT)?.get_password() {
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| BackendError::decode(format!("malformed key index: {e}"))),
            Err(keyring::Error::NoEntry) => Ok(BTreeSet::new()),
            Err(e) => Err(map_keyring_error(INDEX_ACCOUNT, e)),
        }
    }

    fn store_index(namespace: &str, keys: &BTreeSet<String>) -> Result<(), BackendError> {
        let entry = Self::entry(namespace, INDEX_ACCOUNT)?;
        if keys.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(map_keyring_error(INDEX_ACCOUNT, e)),
            };
        }
        let json = serde_json::to_string(keys)
            .map_err(|e| BackendError::status(status::INTERNAL, e.to_string()))?;
        entry
            .set_password(&json)
            .map_err(|e| map_keyring_error(INDEX_ACCOUNT, e))
    }

    /// Entries carry no group, so a grouped lookup of a stored key is a
    /// mismatch. A missing key is still reported missing.
    fn reject_group(request: &StorageRequest<'_>) -> Result<(), BackendError> {
        let Some(group) = request.sharing_group else {
            return Ok(());
        };
        match Self::entry(request.namespace, request.key)?.get_secret() {
            Ok(secret) => {
                drop(Zeroizing::new(secret));
                Err(BackendError::group_mismatch(format!(
                    "entry is not visible in sharing group '{group}'"
                )))
            }
            Err(e) => Err(map_keyring_error(request.key, e)),
        }
    }
}

/// Translate a `keyring` failure into a native-style status.
fn map_keyring_error(key: &str, err: keyring::Error) -> BackendError {
    match err {
        keyring::Error::NoEntry => BackendError::not_found(key),
        keyring::Error::NoStorageAccess(e) => BackendError::status(
            status::INTERACTION_NOT_ALLOWED,
            format!("credential store is locked or inaccessible: {e}"),
        ),
        keyring::Error::BadEncoding(_) => BackendError::decode("credential is not valid UTF-8"),
        keyring::Error::TooLong(attr, max) => BackendError::status(
            status::PARAM,
            format!("attribute '{attr}' exceeds {max} characters"),
        ),
        keyring::Error::Invalid(attr, reason) => {
            BackendError::status(status::PARAM, format!("invalid attribute '{attr}': {reason}"))
        }
        keyring::Error::Ambiguous(_) => BackendError::status(
            status::DUPLICATE_ITEM,
            format!("multiple credentials match '{key}'"),
        ),
        other => BackendError::status(status::INTERNAL, other.to_string()),
    }
}

impl Backend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn write(
        &self,
        request: &StorageRequest<'_>,
        value: &[u8],
        policy: &AccessPolicy,
    ) -> Result<(), BackendError> {
        if policy.require_biometrics {
            return Err(BackendError::Unsupported(
                "the OS credential manager cannot gate entries on biometrics".to_string(),
            ));
        }
        if request.sharing_group.is_some() {
            return Err(BackendError::Unsupported(
                "the OS credential manager has no sharing groups".to_string(),
            ));
        }
        if request.key == INDEX_ACCOUNT {
            return Err(BackendError::status(
                status::PARAM,
                format!("'{INDEX_ACCOUNT}' is a reserved key"),
            ));
        }

        let envelope = crypto::seal(value, request.password, request.key.as_bytes())?;
        Self::entry(request.namespace, request.key)?
            .set_secret(&envelope)
            .map_err(|e| map_keyring_error(request.key, e))?;

        let _guard = self.index_lock.lock();
        let mut index = Self::load_index(request.namespace)?;
        if index.insert(request.key.to_string()) {
            Self::store_index(request.namespace, &index)?;
        }
        debug!(namespace = request.namespace, key = request.key, "stored credential");
        Ok(())
    }

    fn read(&self, request: &StorageRequest<'_>) -> Result<Zeroizing<Vec<u8>>, BackendError> {
        if request.key == INDEX_ACCOUNT {
            return Err(BackendError::not_found(request.key));
        }
        Self::reject_group(request)?;
        let envelope = Zeroizing::new(
            Self::entry(request.namespace, request.key)?
                .get_secret()
                .map_err(|e| map_keyring_error(request.key, e))?,
        );
        Ok(crypto::open(&envelope, request.password, request.key.as_bytes())?)
    }

    fn erase(&self, request: &StorageRequest<'_>) -> Result<(), BackendError> {
        if request.key == INDEX_ACCOUNT {
            return Err(BackendError::not_found(request.key));
        }
        Self::reject_group(request)?;

        let _guard = self.index_lock.lock();
        Self::entry(request.namespace, request.key)?
            .delete_credential()
            .map_err(|e| map_keyring_error(request.key, e))?;

        let mut index = Self::load_index(request.namespace)?;
        if index.remove(request.key) {
            Self::store_index(request.namespace, &index)?;
        }
        Ok(())
    }

    fn erase_all(&self, namespace: &str) -> Result<(), BackendError> {
        let _guard = self.index_lock.lock();
        let index = Self::load_index(namespace)?;
        for key in &index {
            match Self::entry(namespace, key)?.delete_credential() {
                Ok(()) => {}
                Err(keyring::Error::NoEntry) => {
                    warn!(namespace, key = %key, "indexed credential already gone");
                }
                Err(e) => return Err(map_keyring_error(key, e)),
            }
        }
        Self::store_index(namespace, &BTreeSet::new())
    }

    fn list_keys(
        &self,
        namespace: &str,
        _prompt: Option<&str>,
    ) -> Result<BTreeSet<String>, BackendError> {
        Self::load_index(namespace)
    }

    fn probe_biometrics(&self) -> BiometricCapability {
        BiometricCapability::None
    }
}

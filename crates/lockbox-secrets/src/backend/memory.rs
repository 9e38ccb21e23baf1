//! Process-local backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lockbox_core::{AccessPolicy, Accessibility, BiometricCapability};
use parking_lot::Mutex;
use tracing::debug;
use zeroize::Zeroizing;

use super::{match_group, Backend, Entitlements};
use crate::auth::{self, Authenticator};
use crate::crypto;
use crate::error::BackendError;
use crate::types::StorageRequest;

struct MemoryEntry {
    envelope: Zeroizing<Vec<u8>>,
    accessibility: Accessibility,
    sharing_group: Option<String>,
    biometric_binding: Option<String>,
}

/// Keeps entries in a map behind a mutex. Nothing survives the process.
///
/// Values are held in their password envelope, so a process password still
/// isolates entries. Accessibility is recorded but not enforced.
#[derive(Default)]
pub struct MemoryBackend {
    namespaces: Mutex<BTreeMap<String, BTreeMap<String, MemoryEntry>>>,
    entitlements: Entitlements,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entitlements(mut self, entitlements: Entitlements) -> Self {
        self.entitlements = entitlements;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    fn gate(&self) -> Option<&dyn Authenticator> {
        self.authenticator.as_deref()
    }

    /// Number of entries across all namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.lock().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accessibility an entry was written with.
    pub fn accessibility(&self, namespace: &str, key: &str) -> Option<Accessibility> {
        self.namespaces
            .lock()
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .map(|entry| entry.accessibility)
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write(
        &self,
        request: &StorageRequest<'_>,
        value: &[u8],
        policy: &AccessPolicy,
    ) -> Result<(), BackendError> {
        self.entitlements.check(request.sharing_group)?;

        let biometric_binding = if policy.require_biometrics {
            Some(auth::bind_enrollment(self.gate())?)
        } else {
            None
        };
        let envelope = crypto::seal(value, request.password, request.key.as_bytes())?;

        let entry = MemoryEntry {
            envelope,
            accessibility: policy.accessibility,
            sharing_group: request.sharing_group.map(str::to_string),
            biometric_binding,
        };
        self.namespaces
            .lock()
            .entry(request.namespace.to_string())
            .or_default()
            .insert(request.key.to_string(), entry);

        debug!(namespace = request.namespace, key = request.key, "stored entry in memory");
        Ok(())
    }

    fn read(&self, request: &StorageRequest<'_>) -> Result<Zeroizing<Vec<u8>>, BackendError> {
        // Copy out under the lock; the challenge must not hold it.
        let (envelope, sharing_group, binding) = {
            let namespaces = self.namespaces.lock();
            let entry = namespaces
                .get(request.namespace)
                .and_then(|entries| entries.get(request.key))
                .ok_or_else(|| BackendError::not_found(request.key))?;
            (
                entry.envelope.clone(),
                entry.sharing_group.clone(),
                entry.biometric_binding.clone(),
            )
        };

        match_group(request.sharing_group, sharing_group.as_deref())?;
        if let Some(bound_to) = binding {
            auth::verify_bound(self.gate(), &bound_to, request.prompt_or_default())?;
        }

        Ok(crypto::open(&envelope, request.password, request.key.as_bytes())?)
    }

    fn erase(&self, request: &StorageRequest<'_>) -> Result<(), BackendError> {
        let mut namespaces = self.namespaces.lock();
        let entries = namespaces
            .get_mut(request.namespace)
            .ok_or_else(|| BackendError::not_found(request.key))?;
        let entry = entries
            .get(request.key)
            .ok_or_else(|| BackendError::not_found(request.key))?;
        match_group(request.sharing_group, entry.sharing_group.as_deref())?;

        entries.remove(request.key);
        if entries.is_empty() {
            namespaces.remove(request.namespace);
        }
        Ok(())
    }

    fn erase_all(&self, namespace: &str) -> Result<(), BackendError> {
        self.namespaces.lock().remove(namespace);
        Ok(())
    }

    fn list_keys(
        &self,
        namespace: &str,
        prompt: Option<&str>,
    ) -> Result<BTreeSet<String>, BackendError> {
        let (keys, gated) = {
            let namespaces = self.namespaces.lock();
            match namespaces.get(namespace) {
                Some(entries) => (
                    entries.keys().cloned().collect::<BTreeSet<_>>(),
                    entries.values().any(|e| e.biometric_binding.is_some()),
                ),
                None => (BTreeSet::new(), false),
            }
        };

        if gated {
            let gate = self.gate().ok_or_else(|| {
                BackendError::auth_failed("gated entries present but no authenticator is configured")
            })?;
            auth::challenge(gate, prompt.unwrap_or(auth::DEFAULT_PROMPT))?;
        }
        Ok(keys)
    }

    fn probe_biometrics(&self) -> BiometricCapability {
        self.gate()
            .map(|gate| gate.capability())
            .unwrap_or(BiometricCapability::None)
    }
}

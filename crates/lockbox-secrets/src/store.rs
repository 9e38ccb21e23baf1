//! The secret store facade.
//!
//! [`SecretStore`] validates inputs, builds a [`StorageRequest`], calls its
//! [`Backend`] and translates the native result into [`SecretError`]. It keeps
//! no cache; two stores over the same backend and namespace see each other's
//! writes immediately.

use std::collections::BTreeSet;
use std::sync::Arc;

use lockbox_core::types::validate_sharing_group;
use lockbox_core::{AccessPolicy, BiometricCapability, Config, SecretString};
use tracing::debug;

use crate::backend::Backend;
use crate::error::{Operation, Result, SecretError};
use crate::types::{SecretValue, StorageRequest};

/// A namespaced view over one backend.
///
/// The namespace and the optional process password are fixed at construction.
/// An absent password and an empty one are distinct: the empty password is
/// kept as configured and fails on the first write.
pub struct SecretStore {
    backend: Arc<dyn Backend>,
    namespace: String,
    password: Option<SecretString>,
    default_policy: AccessPolicy,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("backend", &self.backend.name())
            .field("namespace", &self.namespace)
            .field("password", &self.password)
            .field("default_policy", &self.default_policy)
            .finish()
    }
}

impl SecretStore {
    /// Create a store over `backend` scoped to `namespace`.
    pub fn new(backend: Arc<dyn Backend>, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(SecretError::InvalidArgument(
                "namespace must not be empty".to_string(),
            ));
        }
        Ok(Self {
            backend,
            namespace,
            password: None,
            default_policy: AccessPolicy::default(),
        })
    }

    /// Build a store from configuration: namespace and default policy.
    pub fn from_config(
        config: &Config,
        backend: Arc<dyn Backend>,
        password: Option<SecretString>,
    ) -> Result<Self> {
        let store = Self::new(backend, config.namespace.clone())?
            .with_default_policy(config.policy.to_policy(None))?;
        Ok(match password {
            Some(password) => store.with_password(password),
            None => store,
        })
    }

    /// Scope every operation of this store to a process password.
    pub fn with_password(mut self, password: impl Into<SecretString>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Replace the policy used by [`set_default`](Self::set_default).
    pub fn with_default_policy(mut self, policy: AccessPolicy) -> Result<Self> {
        policy.validate()?;
        self.default_policy = policy;
        Ok(self)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn default_policy(&self) -> &AccessPolicy {
        &self.default_policy
    }

    /// Store `value` under `key`, replacing any existing entry.
    pub fn set(&self, key: &str, value: &[u8], policy: &AccessPolicy) -> Result<()> {
        if key.is_empty() {
            return Err(SecretError::InvalidArgument(
                "key must not be empty".to_string(),
            ));
        }
        policy.validate()?;

        let password = policy.process_password.as_ref().or(self.password.as_ref());
        let request = StorageRequest::new(&self.namespace, key)
            .with_sharing_group(policy.sharing_group.as_deref())
            .with_password(password);

        debug!(
            backend = self.backend.name(),
            namespace = %self.namespace,
            key,
            accessibility = %policy.accessibility,
            biometric = policy.require_biometrics,
            "set"
        );
        self.backend
            .write(&request, value, policy)
            .map_err(|e| SecretError::from_backend(Operation::Write, key, e))
    }

    /// Store a UTF-8 text value.
    pub fn set_text(&self, key: &str, text: &str, policy: &AccessPolicy) -> Result<()> {
        self.set(key, text.as_bytes(), policy)
    }

    /// Store `value` under the store's default policy.
    pub fn set_default(&self, key: &str, value: &[u8]) -> Result<()> {
        self.set(key, value, &self.default_policy)
    }

    /// Read the value stored under `key`.
    ///
    /// An empty key is a valid but absent key here and yields `NotFound`.
    pub fn get(
        &self,
        key: &str,
        biometric_prompt: Option<&str>,
        sharing_group: Option<&str>,
    ) -> Result<SecretValue> {
        if key.is_empty() {
            return Err(SecretError::NotFound(key.to_string()));
        }
        if let Some(group) = sharing_group {
            validate_sharing_group(group)?;
        }

        let request = StorageRequest::new(&self.namespace, key)
            .with_sharing_group(sharing_group)
            .with_prompt(biometric_prompt)
            .with_password(self.password.as_ref());

        debug!(backend = self.backend.name(), namespace = %self.namespace, key, "get");
        self.backend
            .read(&request)
            .map(SecretValue::from)
            .map_err(|e| SecretError::from_backend(Operation::Read, key, e))
    }

    /// Read a text value. Fails with `InvalidEncoding` on non-UTF-8 bytes.
    pub fn get_text(
        &self,
        key: &str,
        biometric_prompt: Option<&str>,
        sharing_group: Option<&str>,
    ) -> Result<SecretString> {
        let value = self.get(key, biometric_prompt, sharing_group)?;
        Ok(SecretString::new(value.expose_text()?))
    }

    /// Remove the entry under `key`. Absent keys are `NotFound`.
    pub fn delete(&self, key: &str, sharing_group: Option<&str>) -> Result<()> {
        if key.is_empty() {
            return Err(SecretError::NotFound(key.to_string()));
        }
        if let Some(group) = sharing_group {
            validate_sharing_group(group)?;
        }

        let request = StorageRequest::new(&self.namespace, key)
            .with_sharing_group(sharing_group)
            .with_password(self.password.as_ref());

        debug!(backend = self.backend.name(), namespace = %self.namespace, key, "delete");
        self.backend
            .erase(&request)
            .map_err(|e| SecretError::from_backend(Operation::Erase, key, e))
    }

    /// Remove every entry in the namespace. An empty namespace is fine.
    pub fn clear(&self) -> Result<()> {
        debug!(backend = self.backend.name(), namespace = %self.namespace, "clear");
        match self.backend.erase_all(&self.namespace) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(SecretError::from_backend(
                Operation::EraseAll,
                &self.namespace,
                e,
            )),
        }
    }

    /// Every key stored in the namespace.
    ///
    /// An empty namespace is reported as `NotFound` rather than an empty set.
    pub fn stored_keys(&self, biometric_prompt: Option<&str>) -> Result<BTreeSet<String>> {
        debug!(backend = self.backend.name(), namespace = %self.namespace, "stored_keys");
        let keys = self
            .backend
            .list_keys(&self.namespace, biometric_prompt)
            .map_err(|e| SecretError::from_backend(Operation::List, &self.namespace, e))?;
        if keys.is_empty() {
            return Err(SecretError::NotFound(self.namespace.clone()));
        }
        Ok(keys)
    }

    /// Which biometric sensor the backend can gate on.
    pub fn biometric_capability(&self) -> BiometricCapability {
        self.backend.probe_biometrics()
    }

    pub fn is_touch_id_supported(&self) -> bool {
        self.biometric_capability() == BiometricCapability::TouchEquivalent
    }

    pub fn is_face_id_supported(&self) -> bool {
        self.biometric_capability() == BiometricCapability::FaceEquivalent
    }
}

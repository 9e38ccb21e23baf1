//! Encrypted file vault backend.
//!
//! Each entry is a JSON file at `{root}/{sha256(namespace)}/{sha256(key)}.json`.
//! Hashed names keep arbitrary keys off the file system and out of directory
//! listings. The value is first wrapped in its password envelope, then
//! encrypted under a per-file key derived from the vault master key with the
//! namespace and key as associated data. Files are written atomically with
//! mode `0600`; directories get `0700`.

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use lockbox_core::{AccessPolicy, Accessibility, BiometricCapability};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{match_group, Backend, Entitlements};
use crate::auth::{self, Authenticator};
use crate::crypto;
use crate::error::BackendError;
use crate::types::StorageRequest;

const RECORD_VERSION: u32 = 1;

/// On-disk representation of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct VaultRecord {
    version: u32,
    /// Plain key, kept so enumeration can report it.
    key: String,
    accessibility: Accessibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sharing_group: Option<String>,
    /// Enrollment fingerprint the entry is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    biometric_binding: Option<String>,
    /// AES-256-GCM encrypted envelope, base64-encoded.
    encrypted_value: String,
    /// HKDF salt, hex-encoded.
    salt: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A file-system-backed vault.
pub struct FileBackend {
    root: PathBuf,
    master_key: Zeroizing<Vec<u8>>,
    entitlements: Entitlements,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl FileBackend {
    /// Create a vault rooted at `root` using the provided master key.
    pub fn new(root: PathBuf, master_key: Zeroizing<Vec<u8>>) -> Self {
        Self {
            root,
            master_key,
            entitlements: Entitlements::default(),
            authenticator: None,
        }
    }

    pub fn with_entitlements(mut self, entitlements: Entitlements) -> Self {
        self.entitlements = entitlements;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn gate(&self) -> Option<&dyn Authenticator> {
        self.authenticator.as_deref()
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(hashed_name(namespace))
    }

    fn entry_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.namespace_dir(namespace)
            .join(format!("{}.json", hashed_name(key)))
    }

    /// Load the record for `key`, or report it missing.
    fn load(&self, namespace: &str, key: &str) -> Result<VaultRecord, BackendError> {
        let path = self.entry_path(namespace, key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(BackendError::not_found(key)),
            Err(e) => return Err(BackendError::io("failed to read vault entry", e)),
        };
        let record: VaultRecord = serde_json::from_str(&data)
            .map_err(|e| BackendError::decode(format!("malformed vault entry: {e}")))?;
        if record.key != key {
            return Err(BackendError::decode("vault entry belongs to a different key"));
        }
        Ok(record)
    }

    fn decrypt_record(
        &self,
        namespace: &str,
        record: &VaultRecord,
    ) -> Result<Zeroizing<Vec<u8>>, BackendError> {
        let encrypted = base64::engine::general_purpose::STANDARD
            .decode(&record.encrypted_value)
            .map_err(|e| BackendError::decode(format!("base64 decode failed: {e}")))?;
        let salt = hex::decode(&record.salt)
            .map_err(|e| BackendError::decode(format!("hex decode failed: {e}")))?;
        let aad = entry_aad(namespace, &record.key);
        Ok(crypto::decrypt(&self.master_key, &encrypted, &salt, &aad)?)
    }
}

/// SHA-256 of `name`, hex-encoded.
fn hashed_name(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

/// Associated data binding ciphertext to its location.
fn entry_aad(namespace: &str, key: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(namespace.len() + key.len() + 1);
    aad.extend_from_slice(namespace.as_bytes());
    aad.push(0);
    aad.extend_from_slice(key.as_bytes());
    aad
}

/// Create `dir` with mode 0700 on Unix.
fn ensure_dir(dir: &Path) -> Result<(), BackendError> {
    fs::create_dir_all(dir).map_err(|e| BackendError::io("failed to create vault directory", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| BackendError::io("failed to restrict vault directory", e))?;
    }

    Ok(())
}

/// Write `data` to `path` through a temp file and rename. Mode 0600 on Unix.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), BackendError> {
    let tmp = path.with_extension(format!("{:016x}.tmp", rand::random::<u64>()));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let result = options
        .open(&tmp)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(BackendError::io("failed to write vault entry", e));
    }
    Ok(())
}

impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
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
        let aad = entry_aad(request.namespace, request.key);
        let (encrypted, salt) = crypto::encrypt(&self.master_key, &envelope, &aad)?;

        let now = Utc::now();
        // An unreadable previous record is simply replaced.
        let created_at = self
            .load(request.namespace, request.key)
            .map(|previous| previous.created_at)
            .unwrap_or(now);
        let record = VaultRecord {
            version: RECORD_VERSION,
            key: request.key.to_string(),
            accessibility: policy.accessibility,
            sharing_group: request.sharing_group.map(str::to_string),
            biometric_binding,
            encrypted_value: base64::engine::general_purpose::STANDARD.encode(&encrypted),
            salt: hex::encode(&salt),
            created_at,
            updated_at: now,
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| BackendError::status(crate::status::INTERNAL, e.to_string()))?;

        ensure_dir(&self.root)?;
        let dir = self.namespace_dir(request.namespace);
        ensure_dir(&dir)?;
        let path = self.entry_path(request.namespace, request.key);
        debug!(key = request.key, path = %path.display(), "writing vault entry");
        write_atomic(&path, &json)
    }

    fn read(&self, request: &StorageRequest<'_>) -> Result<Zeroizing<Vec<u8>>, BackendError> {
        let record = self.load(request.namespace, request.key)?;

        match_group(request.sharing_group, record.sharing_group.as_deref())?;
        if let Some(bound_to) = &record.biometric_binding {
            auth::verify_bound(self.gate(), bound_to, request.prompt_or_default())?;
        }

        let envelope = self.decrypt_record(request.namespace, &record)?;
        Ok(crypto::open(&envelope, request.password, request.key.as_bytes())?)
    }

    fn erase(&self, request: &StorageRequest<'_>) -> Result<(), BackendError> {
        if request.sharing_group.is_some() {
            let record = self.load(request.namespace, request.key)?;
            match_group(request.sharing_group, record.sharing_group.as_deref())?;
        }

        let path = self.entry_path(request.namespace, request.key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key = request.key, "removed vault entry");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BackendError::not_found(request.key)),
            Err(e) => Err(BackendError::io("failed to remove vault entry", e)),
        }
    }

    fn erase_all(&self, namespace: &str) -> Result<(), BackendError> {
        match fs::remove_dir_all(self.namespace_dir(namespace)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::io("failed to clear vault namespace", e)),
        }
    }

    fn list_keys(
        &self,
        namespace: &str,
        prompt: Option<&str>,
    ) -> Result<BTreeSet<String>, BackendError> {
        let dir = self.namespace_dir(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(BackendError::io("failed to read vault namespace", e)),
        };

        let mut keys = BTreeSet::new();
        let mut gated = false;
        for entry in entries {
            let entry = entry.map_err(|e| BackendError::io("failed to read vault namespace", e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let record = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|data| {
                    serde_json::from_str::<VaultRecord>(&data).map_err(|e| e.to_string())
                });
            match record {
                Ok(record) => {
                    gated |= record.biometric_binding.is_some();
                    keys.insert(record.key);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable vault entry");
                }
            }
        }

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

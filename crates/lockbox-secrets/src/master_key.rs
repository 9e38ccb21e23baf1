//! Master key resolution for the file vault.
//!
//! The master key is resolved in priority order:
//! 1. `LOCKBOX_MASTER_KEY` environment variable (hex-encoded)
//! 2. OS credential manager (feature `os-keyring`)
//! 3. Generate a new key and store it in the credential manager
//!
//! Without the `os-keyring` feature a generated key cannot be persisted and
//! a warning tells the user how to reuse it.

use lockbox_core::env::{self, MASTER_KEY_VAR};
use tracing::debug;
#[cfg(not(feature = "os-keyring"))]
use tracing::warn;
use zeroize::Zeroizing;

use crate::crypto::{self, KEY_SIZE};
use crate::error::{Result, SecretError};
#[cfg(feature = "os-keyring")]
use crate::status;

const ACCOUNT_NAME: &str = "vault-master-key";

/// Credential-manager service holding the master key for `namespace`.
fn service_name(namespace: &str) -> String {
    format!("{namespace}.vault")
}

/// Decode a hex master key, checking its length.
pub fn parse_hex_key(hex_key: &str, source: &str) -> Result<Zeroizing<Vec<u8>>> {
    let key = Zeroizing::new(
        hex::decode(hex_key.trim())
            .map_err(|e| SecretError::InvalidArgument(format!("invalid hex in {source}: {e}")))?,
    );
    if key.len() != KEY_SIZE {
        return Err(SecretError::InvalidArgument(format!(
            "{source} must decode to exactly {KEY_SIZE} bytes, got {}",
            key.len()
        )));
    }
    Ok(key)
}

/// Retrieve the vault master key, creating one if it does not exist yet.
pub fn get_or_create_master_key(namespace: &str) -> Result<Zeroizing<Vec<u8>>> {
    if let Some(hex_key) = env::get_var(MASTER_KEY_VAR) {
        debug!("using master key from environment variable");
        return parse_hex_key(&hex_key, MASTER_KEY_VAR);
    }

    let service = service_name(namespace);
    if let Some(key) = load_stored(&service)? {
        debug!(service = %service, "using stored master key");
        return Ok(key);
    }

    debug!(service = %service, "generating new vault master key");
    let key = crypto::generate_master_key();
    persist(&service, &key)?;
    Ok(key)
}

#[cfg(feature = "os-keyring")]
fn keyring_error(context: &str, e: keyring::Error) -> SecretError {
    SecretError::BackendRejected {
        code: status::INTERNAL,
        message: format!("{context}: {e}"),
    }
}

#[cfg(feature = "os-keyring")]
fn load_stored(service: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
    let entry = keyring::Entry::new(service, ACCOUNT_NAME)
        .map_err(|e| keyring_error("credential manager unavailable", e))?;
    match entry.get_password() {
        Ok(hex_key) => parse_hex_key(&Zeroizing::new(hex_key), "stored master key").map(Some),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error("master key read failed", e)),
    }
}

#[cfg(feature = "os-keyring")]
fn persist(service: &str, key: &[u8]) -> Result<()> {
    let entry = keyring::Entry::new(service, ACCOUNT_NAME)
        .map_err(|e| keyring_error("credential manager unavailable", e))?;
    entry
        .set_password(&Zeroizing::new(hex::encode(key)))
        .map_err(|e| keyring_error("master key write failed", e))
}

#[cfg(not(feature = "os-keyring"))]
fn load_stored(_service: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
    Ok(None)
}

#[cfg(not(feature = "os-keyring"))]
fn persist(_service: &str, _key: &[u8]) -> Result<()> {
    warn!(
        "built without a credential manager; the vault master key lives only in this process. \
         Set {MASTER_KEY_VAR} to a 64-character hex key to reuse a vault across runs."
    );
    Ok(())
}

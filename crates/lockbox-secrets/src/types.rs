//! Core types for secret storage.
//!
//! [`SecretValue`] is the in-memory form of a secret; [`StorageRequest`] is the
//! normalized request a [`SecretStore`](crate::SecretStore) hands to its backend.

use lockbox_core::secret::constant_time_eq;
use lockbox_core::SecretString;
use std::fmt;
use zeroize::Zeroizing;

use crate::auth::DEFAULT_PROMPT;
use crate::error::{Result, SecretError};

/// An opaque secret value held in memory.
///
/// Bytes are zeroed on drop. Debug and Display both emit `[REDACTED]`.
#[derive(Clone)]
pub struct SecretValue {
    bytes: Zeroizing<Vec<u8>>,
}

impl SecretValue {
    /// Wrap raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes.into()),
        }
    }

    /// UTF-8 encode a text secret.
    pub fn from_text(text: &str) -> Self {
        Self::new(text.as_bytes())
    }

    /// Expose the raw bytes. Use sparingly.
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    /// Expose the value as text.
    ///
    /// Fails with [`SecretError::InvalidEncoding`] if the bytes are not UTF-8;
    /// nothing is replaced or truncated.
    pub fn expose_text(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes).map_err(|e| SecretError::InvalidEncoding(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.bytes, &other.bytes)
    }
}

impl Eq for SecretValue {}

impl From<Vec<u8>> for SecretValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<Zeroizing<Vec<u8>>> for SecretValue {
    fn from(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self { bytes }
    }
}

impl From<&[u8]> for SecretValue {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for SecretValue {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

impl From<String> for SecretValue {
    fn from(text: String) -> Self {
        Self::new(text.into_bytes())
    }
}

/// A normalized request handed to a backend.
///
/// Built by the store after validation; backends never see an empty key on
/// write or a malformed sharing group.
#[derive(Debug, Clone, Copy)]
pub struct StorageRequest<'a> {
    /// Namespace ("service") the entry lives in.
    pub namespace: &'a str,

    /// Entry key ("account").
    pub key: &'a str,

    /// Sharing group to scope the lookup to, if any.
    pub sharing_group: Option<&'a str>,

    /// Text shown during a biometric challenge.
    pub prompt: Option<&'a str>,

    /// Process password applied to this call.
    pub password: Option<&'a SecretString>,
}

impl<'a> StorageRequest<'a> {
    pub fn new(namespace: &'a str, key: &'a str) -> Self {
        Self {
            namespace,
            key,
            sharing_group: None,
            prompt: None,
            password: None,
        }
    }

    pub fn with_sharing_group(mut self, group: Option<&'a str>) -> Self {
        self.sharing_group = group;
        self
    }

    pub fn with_prompt(mut self, prompt: Option<&'a str>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_password(mut self, password: Option<&'a SecretString>) -> Self {
        self.password = password;
        self
    }

    /// Prompt text, falling back to [`DEFAULT_PROMPT`].
    pub fn prompt_or_default(&self) -> &'a str {
        self.prompt.unwrap_or(DEFAULT_PROMPT)
    }
}

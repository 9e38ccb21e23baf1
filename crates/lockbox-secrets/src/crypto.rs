//! AES-256-GCM encryption with HKDF-SHA256 and Argon2 key derivation.
//!
//! Two layers live here:
//!
//! - [`encrypt`] / [`decrypt`]: master-key encryption used by the file vault.
//!   Each entry gets a fresh random salt; the master key is never used
//!   directly as a cipher key. The nonce is prepended to the ciphertext.
//! - [`seal`] / [`open`]: the process-password envelope. Every value a backend
//!   persists is wrapped in a one-byte-tagged envelope; with a password the
//!   payload is encrypted under a key stretched from it with Argon2.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use argon2::Argon2;
use hkdf::Hkdf;
use lockbox_core::SecretString;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::error::BackendError;
use crate::status;

const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 32;
const PASSWORD_SALT_SIZE: usize = 16;

/// Size in bytes of a master key.
pub const KEY_SIZE: usize = 32;

/// HKDF info string used to domain-separate derived keys.
const HKDF_INFO: &[u8] = b"lockbox-vault-entry-v1";

const ENVELOPE_PLAIN: u8 = 0x00;
const ENVELOPE_SEALED: u8 = 0x01;

/// Cryptographic failures.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("process password is empty")]
    EmptyPassword,

    #[error("entry is password protected")]
    PasswordRequired,

    #[error("wrong process password")]
    WrongPassword,

    #[error("malformed envelope: {0}")]
    Malformed(String),
}

impl From<CryptoError> for BackendError {
    fn from(e: CryptoError) -> Self {
        let code = match &e {
            CryptoError::EmptyPassword
            | CryptoError::PasswordRequired
            | CryptoError::WrongPassword => status::AUTH_FAILED,
            CryptoError::Decrypt(_) | CryptoError::Malformed(_) => status::DECODE,
            CryptoError::Encrypt(_) | CryptoError::Kdf(_) => status::INTERNAL,
        };
        BackendError::status(code, e.to_string())
    }
}

/// Derive a 256-bit encryption key from `master_key` and `salt` via HKDF-SHA256.
fn derive_key(master_key: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), master_key);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(HKDF_INFO, &mut okm[..])
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(okm)
}

/// Stretch a process password into a 256-bit key with Argon2id.
fn derive_password_key(
    password: &SecretString,
    salt: &[u8],
) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(key)
}

fn aead_encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Encrypt(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

fn aead_decrypt(key: &[u8], encrypted: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if encrypted.len() < NONCE_SIZE {
        return Err(CryptoError::Decrypt("ciphertext too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Decrypt(e.to_string()))?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Decrypt(e.to_string()))
}

/// Encrypt `plaintext` under a key derived from `master_key`.
///
/// `aad` binds the ciphertext to its context (the vault uses the entry key),
/// so a file copied under another name fails to decrypt.
/// Returns `(nonce || ciphertext_with_tag, salt)`.
pub fn encrypt(
    master_key: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let mut salt = vec![0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);

    let key = derive_key(master_key, &salt)?;
    let encrypted = aead_encrypt(&key[..], plaintext, aad)?;
    Ok((encrypted, salt))
}

/// Decrypt data previously produced by [`encrypt`].
pub fn decrypt(
    master_key: &[u8],
    encrypted: &[u8],
    salt: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let key = derive_key(master_key, salt)?;
    aead_decrypt(&key[..], encrypted, aad).map(Zeroizing::new)
}

/// Generate a new random 256-bit master key.
pub fn generate_master_key() -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; KEY_SIZE]);
    rand::thread_rng().fill_bytes(key.as_mut_slice());
    key
}

/// Wrap `value` in a process-password envelope.
///
/// Without a password the envelope is a plain tag plus the value. An empty
/// password is rejected rather than treated as "no password".
pub fn seal(
    value: &[u8],
    password: Option<&SecretString>,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let Some(password) = password else {
        let mut out = Zeroizing::new(Vec::with_capacity(1 + value.len()));
        out.push(ENVELOPE_PLAIN);
        out.extend_from_slice(value);
        return Ok(out);
    };
    if password.is_empty() {
        return Err(CryptoError::EmptyPassword);
    }

    let mut salt = [0u8; PASSWORD_SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive_password_key(password, &salt)?;
    let encrypted = aead_encrypt(&key[..], value, aad)?;

    let mut out = Zeroizing::new(Vec::with_capacity(1 + PASSWORD_SALT_SIZE + encrypted.len()));
    out.push(ENVELOPE_SEALED);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&encrypted);
    Ok(out)
}

/// Unwrap an envelope produced by [`seal`].
///
/// Plain envelopes open with or without a password. Sealed envelopes need the
/// exact password they were sealed with.
pub fn open(
    envelope: &[u8],
    password: Option<&SecretString>,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let (tag, body) = envelope
        .split_first()
        .ok_or_else(|| CryptoError::Malformed("empty envelope".to_string()))?;

    match *tag {
        ENVELOPE_PLAIN => Ok(Zeroizing::new(body.to_vec())),
        ENVELOPE_SEALED => {
            let password = password.ok_or(CryptoError::PasswordRequired)?;
            if body.len() < PASSWORD_SALT_SIZE {
                return Err(CryptoError::Malformed("sealed envelope too short".to_string()));
            }
            let (salt, encrypted) = body.split_at(PASSWORD_SALT_SIZE);
            let key = derive_password_key(password, salt)?;
            aead_decrypt(&key[..], encrypted, aad)
                .map(Zeroizing::new)
                .map_err(|_| CryptoError::WrongPassword)
        }
        other => Err(CryptoError::Malformed(format!("unknown envelope tag {other:#04x}"))),
    }
}

//! Secure credential storage for Lockbox.
//!
//! [`SecretStore`] is the entry point: a namespaced view over one
//! [`Backend`](backend::Backend) with a uniform error model and per-entry
//! [`AccessPolicy`](lockbox_core::AccessPolicy). Backends cover process
//! memory, an encrypted file vault, the OS credential manager and the Apple
//! keychain.

pub mod auth;
pub mod backend;
pub mod crypto;
pub mod error;
pub mod master_key;
pub mod status;
pub mod store;
pub mod types;

pub use auth::{AuthOutcome, Authenticator, ScriptedAuthenticator};
pub use backend::{open_backend, Backend, Entitlements, FileBackend, MemoryBackend};
pub use error::{BackendError, Result, SecretError};
pub use store::SecretStore;
pub use types::{SecretValue, StorageRequest};

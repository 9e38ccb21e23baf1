//! Shared fixtures for the integration tests.

use std::sync::Arc;

use lockbox_core::BiometricCapability;
use lockbox_secrets::crypto::generate_master_key;
use lockbox_secrets::{Backend, FileBackend, MemoryBackend, ScriptedAuthenticator};
use tempfile::TempDir;

/// A backend under test plus whatever keeps it alive.
pub struct Fixture {
    pub name: &'static str,
    pub backend: Arc<dyn Backend>,
    pub gate: Arc<ScriptedAuthenticator>,
    _dir: Option<TempDir>,
}

/// Every software backend, each wired to an approving fingerprint sensor.
pub fn software_backends() -> Vec<Fixture> {
    let memory_gate = Arc::new(ScriptedAuthenticator::approving(
        BiometricCapability::TouchEquivalent,
    ));
    let memory = MemoryBackend::new().with_authenticator(memory_gate.clone());

    let dir = TempDir::new().expect("temp dir");
    let file_gate = Arc::new(ScriptedAuthenticator::approving(
        BiometricCapability::TouchEquivalent,
    ));
    let file = FileBackend::new(dir.path().join("vault"), generate_master_key())
        .with_authenticator(file_gate.clone());

    vec![
        Fixture {
            name: "memory",
            backend: Arc::new(memory),
            gate: memory_gate,
            _dir: None,
        },
        Fixture {
            name: "file",
            backend: Arc::new(file),
            gate: file_gate,
            _dir: Some(dir),
        },
    ]
}

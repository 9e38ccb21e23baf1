//! Config persistence and backend selection.

use lockbox_core::config::{BackendKind, Config};
use lockbox_core::Accessibility;
use lockbox_secrets::{open_backend, status, SecretStore};
use tempfile::TempDir;

#[test]
fn test_config_save_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lockbox.json5");

    let mut config = Config::default();
    config.namespace = "com.example.roundtrip".to_string();
    config.backend.kind = BackendKind::Memory;
    config.backend.access_groups = vec!["TEAM.shared".to_string()];
    config.policy.accessibility = Accessibility::Always;
    config.policy.sharing_group = Some("TEAM.shared".to_string());
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    loaded.validate().unwrap();
    assert_eq!(loaded.namespace, "com.example.roundtrip");
    assert_eq!(loaded.backend.kind, BackendKind::Memory);
    assert_eq!(loaded.backend.access_groups, vec!["TEAM.shared".to_string()]);
    assert_eq!(loaded.policy.accessibility, Accessibility::Always);
    assert_eq!(loaded.policy.sharing_group.as_deref(), Some("TEAM.shared"));
}

#[test]
fn test_invalid_json5_is_rejected() {
    assert!(Config::parse("{ namespace: ").is_err());
    assert!(Config::parse(r#"{ backend: { kind: "floppy" } }"#).is_err());
}

#[test]
fn test_configured_policy_reaches_store() {
    let config = Config::parse(
        r#"{
            namespace: "com.example.policy",
            backend: { kind: "memory", access_groups: ["TEAM.a"] },
            policy: { accessibility: "after_first_unlock", sharing_group: "TEAM.a" },
        }"#,
    )
    .unwrap();
    config.validate().unwrap();

    let backend = open_backend(&config, None).unwrap();
    let store = SecretStore::from_config(&config, backend, None).unwrap();
    assert_eq!(store.namespace(), "com.example.policy");
    assert_eq!(
        store.default_policy().accessibility,
        Accessibility::AfterFirstUnlock
    );

    store.set_default("k", b"v").unwrap();
    assert!(store.get("k", None, Some("TEAM.a")).is_ok());
}

#[test]
fn test_access_groups_become_entitlements() {
    let config = Config::parse(
        r#"{ backend: { kind: "memory", access_groups: ["TEAM.a"] } }"#,
    )
    .unwrap();
    let backend = open_backend(&config, None).unwrap();
    let store = SecretStore::new(backend, "com.example.ent").unwrap();

    let policy = lockbox_core::AccessPolicy::default().with_sharing_group("TEAM.b");
    let err = store.set("k", b"v", &policy).unwrap_err();
    assert_eq!(err.code(), Some(status::MISSING_ENTITLEMENT));
}

#[cfg(not(target_os = "macos"))]
#[test]
fn test_keychain_backend_needs_macos() {
    let mut config = Config::default();
    config.backend.kind = BackendKind::Keychain;
    let err = open_backend(&config, None).err().unwrap();
    assert_eq!(err.code(), Some(status::UNIMPLEMENTED));
}

//! Behavioral properties of `SecretStore`, checked against every software backend.

use std::collections::BTreeSet;
use std::sync::Arc;

use lockbox_core::{AccessPolicy, Accessibility};
use lockbox_integration_tests::software_backends;
use lockbox_secrets::status;
use lockbox_secrets::{AuthOutcome, SecretError, SecretStore};

const NAMESPACE: &str = "com.example.integration";

fn policies() -> Vec<AccessPolicy> {
    let mut out = Vec::new();
    for accessibility in [
        Accessibility::WhenUnlocked,
        Accessibility::AfterFirstUnlock,
        Accessibility::Always,
    ] {
        for biometrics in [false, true] {
            for group in [None, Some("TEAM.shared")] {
                let mut policy = AccessPolicy::default()
                    .with_accessibility(accessibility)
                    .with_biometrics(biometrics);
                if let Some(group) = group {
                    policy = policy.with_sharing_group(group);
                }
                out.push(policy);
            }
        }
    }
    out
}

#[test]
fn test_round_trip_every_policy() {
    for fixture in software_backends() {
        for (i, policy) in policies().into_iter().enumerate() {
            for password in [None, Some("p1")] {
                let mut store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
                if let Some(password) = password {
                    store = store.with_password(password);
                }
                let key = format!("key-{i}-{}", password.is_some());
                let value = format!("value for {key}");

                store.set(&key, value.as_bytes(), &policy).unwrap();
                let read = store
                    .get(&key, Some("Read secret"), policy.sharing_group.as_deref())
                    .unwrap_or_else(|e| panic!("{}: {policy:?}: {e}", fixture.name));
                assert_eq!(read.expose(), value.as_bytes(), "{}", fixture.name);
            }
        }
    }
}

#[test]
fn test_overwrite_never_merges() {
    for fixture in software_backends() {
        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        store
            .set("k", b"first", &AccessPolicy::default().with_biometrics(true))
            .unwrap();
        store.set("k", b"second", &AccessPolicy::default()).unwrap();

        let before = fixture.gate.challenge_count();
        assert_eq!(store.get("k", None, None).unwrap().expose(), b"second");
        // The new policy replaced the biometric one.
        assert_eq!(fixture.gate.challenge_count(), before, "{}", fixture.name);
    }
}

#[test]
fn test_delete_then_read() {
    for fixture in software_backends() {
        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        store.set("k", b"v", &AccessPolicy::default()).unwrap();
        store.delete("k", None).unwrap();

        let err = store.get("k", None, None).unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)), "{}", fixture.name);
        assert!(store.delete("k", None).unwrap_err().is_not_found());
    }
}

#[test]
fn test_clear_semantics() {
    for fixture in software_backends() {
        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        store.clear().unwrap();

        store.set("k1", b"1", &AccessPolicy::default()).unwrap();
        store.set("k2", b"2", &AccessPolicy::default()).unwrap();
        store.clear().unwrap();

        assert!(store.get("k1", None, None).unwrap_err().is_not_found());
        assert!(store.get("k2", None, None).unwrap_err().is_not_found());
        store.clear().unwrap();
    }
}

#[test]
fn test_enumeration() {
    for fixture in software_backends() {
        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        let keys: BTreeSet<String> = (1..=5).map(|i| format!("K{i}")).collect();
        for key in &keys {
            store.set(key, b"v", &AccessPolicy::default()).unwrap();
        }
        assert_eq!(store.stored_keys(None).unwrap(), keys, "{}", fixture.name);

        for key in &keys {
            store.delete(key, None).unwrap();
        }
        assert!(store.stored_keys(None).unwrap_err().is_not_found());
    }
}

#[test]
fn test_enumeration_gated_by_single_challenge() {
    for fixture in software_backends() {
        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        let gated = AccessPolicy::default().with_biometrics(true);
        store.set("a", b"1", &gated).unwrap();
        store.set("b", b"2", &gated).unwrap();
        store.set("c", b"3", &AccessPolicy::default()).unwrap();

        let before = fixture.gate.challenge_count();
        assert_eq!(store.stored_keys(Some("List")).unwrap().len(), 3);
        assert_eq!(fixture.gate.challenge_count(), before + 1, "{}", fixture.name);

        fixture.gate.push(AuthOutcome::Failed);
        assert!(matches!(
            store.stored_keys(None),
            Err(SecretError::AuthenticationFailed)
        ));
    }
}

#[test]
fn test_validation() {
    for fixture in software_backends() {
        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        assert!(matches!(
            store.set("", b"v", &AccessPolicy::default()),
            Err(SecretError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.get("", None, None),
            Err(SecretError::NotFound(_))
        ));
    }
}

#[test]
fn test_sharing_group_mismatch() {
    for fixture in software_backends() {
        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        store
            .set(
                "k",
                b"v",
                &AccessPolicy::default().with_sharing_group("TEAM.group-a"),
            )
            .unwrap();

        match store.get("k", None, Some("TEAM.group-b")) {
            Err(SecretError::BackendRejected { code, .. }) => {
                assert_eq!(code, status::GROUP_MISMATCH, "{}", fixture.name)
            }
            other => panic!("{}: expected group mismatch, got {other:?}", fixture.name),
        }
        assert!(store.get("k", None, Some("TEAM.group-a")).is_ok());
        assert!(store.get("k", None, None).is_ok());
    }
}

#[test]
fn test_process_password_isolation() {
    for fixture in software_backends() {
        let writer = SecretStore::new(fixture.backend.clone(), NAMESPACE)
            .unwrap()
            .with_password("P1");
        writer.set("k", b"v", &AccessPolicy::default()).unwrap();

        let intruder = SecretStore::new(fixture.backend.clone(), NAMESPACE)
            .unwrap()
            .with_password("P2");
        let err = intruder.get("k", None, None).unwrap_err();
        assert!(
            matches!(err, SecretError::AuthenticationFailed),
            "{}: {err:?}",
            fixture.name
        );

        let reopened = SecretStore::new(fixture.backend.clone(), NAMESPACE)
            .unwrap()
            .with_password("P1");
        assert_eq!(reopened.get("k", None, None).unwrap().expose(), b"v");
    }
}

#[test]
fn test_empty_password_is_distinct_from_none() {
    for fixture in software_backends() {
        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE)
            .unwrap()
            .with_password("");
        let err = store.set("k", b"v", &AccessPolicy::default()).unwrap_err();
        assert_eq!(err.code(), Some(status::AUTH_FAILED), "{}", fixture.name);

        let plain = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        plain.set("k", b"v", &AccessPolicy::default()).unwrap();
    }
}

#[test]
fn test_biometric_cancel_and_reenrollment() {
    for fixture in software_backends() {
        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        store
            .set("k", b"v", &AccessPolicy::default().with_biometrics(true))
            .unwrap();

        fixture.gate.push(AuthOutcome::Canceled);
        assert!(matches!(
            store.get("k", Some("Unlock"), None),
            Err(SecretError::AuthenticationCanceled)
        ));

        fixture.gate.set_enrollment(Some("enrollment-2"));
        assert!(matches!(
            store.get("k", None, None),
            Err(SecretError::AuthenticationFailed)
        ));
    }
}

#[test]
fn test_stores_share_backend_without_caching() {
    for fixture in software_backends() {
        let a = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        let b = SecretStore::new(Arc::clone(&fixture.backend), NAMESPACE).unwrap();

        a.set("k", b"from a", &AccessPolicy::default()).unwrap();
        assert_eq!(b.get("k", None, None).unwrap().expose(), b"from a");
        b.set("k", b"from b", &AccessPolicy::default()).unwrap();
        assert_eq!(a.get("k", None, None).unwrap().expose(), b"from b");
    }
}

#[test]
fn test_concurrent_writers_last_writer_wins() {
    for fixture in software_backends() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let backend = fixture.backend.clone();
                std::thread::spawn(move || {
                    let store = SecretStore::new(backend, NAMESPACE).unwrap();
                    store
                        .set("shared", format!("writer-{i}").as_bytes(), &AccessPolicy::default())
                        .unwrap();
                    store
                        .set(&format!("own-{i}"), b"v", &AccessPolicy::default())
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = SecretStore::new(fixture.backend.clone(), NAMESPACE).unwrap();
        let value = store.get_text("shared", None, None).unwrap();
        assert!(value.expose_secret().starts_with("writer-"));
        assert_eq!(store.stored_keys(None).unwrap().len(), 9, "{}", fixture.name);
    }
}

//! CLI parsing and command dispatch against a temporary config.

use std::path::{Path, PathBuf};
use std::sync::Once;

use clap::Parser;
use lockbox_cli::commands::Session;
use lockbox_cli::{run, Cli, Commands};
use lockbox_core::config::{BackendKind, Config};
use tempfile::TempDir;

static MASTER_KEY: Once = Once::new();

/// File-backed runs resolve their vault key from the environment.
fn pin_master_key() {
    MASTER_KEY.call_once(|| {
        std::env::set_var(lockbox_core::env::MASTER_KEY_VAR, "11".repeat(32));
    });
}

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("lockbox.json5");
    std::fs::write(&path, body).unwrap();
    path
}

fn parse(config: &Path, args: &[&str]) -> Cli {
    let mut argv = vec!["lockbox", "--config", config.to_str().unwrap()];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[test]
fn test_every_subcommand_parses() {
    let cases: &[&[&str]] = &[
        &["lockbox", "set", "k", "--value", "v"],
        &["lockbox", "get", "k"],
        &["lockbox", "delete", "k", "--ignore-missing"],
        &["lockbox", "clear", "--yes"],
        &["lockbox", "keys"],
        &["lockbox", "capability", "--json"],
        &["lockbox", "config", "path"],
        &["lockbox", "init", "--force"],
        &["lockbox", "version"],
    ];
    for argv in cases {
        assert!(Cli::try_parse_from(*argv).is_ok(), "failed to parse {argv:?}");
    }
}

#[test]
fn test_missing_key_argument_is_rejected() {
    assert!(Cli::try_parse_from(["lockbox", "get"]).is_err());
    assert!(Cli::try_parse_from(["lockbox", "set", "k", "--value", "v", "--stdin"]).is_err());
}

#[tokio::test]
async fn test_init_then_config_commands() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf").join("lockbox.json5");
    let config = path.to_str().unwrap();

    run(Cli::try_parse_from(["lockbox", "--config", config, "init"]).unwrap())
        .await
        .unwrap();
    assert!(Config::load(&path).is_ok());

    let again = run(Cli::try_parse_from(["lockbox", "--config", config, "init"]).unwrap()).await;
    assert!(again.is_err());

    for sub in ["show", "path", "validate"] {
        run(Cli::try_parse_from(["lockbox", "--config", config, "config", sub]).unwrap())
            .await
            .unwrap();
    }
    let missing = run(Cli::try_parse_from([
        "lockbox", "--config", config, "config", "get", "no.such.key",
    ])
    .unwrap())
    .await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn test_invalid_config_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ namespace: "" }"#);
    let result = run(parse(&path, &["config", "validate"])).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_secret_commands_on_file_vault() {
    pin_master_key();
    let dir = TempDir::new().unwrap();
    let vault = dir.path().join("vault");
    let path = write_config(
        &dir,
        &format!(
            r#"{{ namespace: "com.example.cli", backend: {{ kind: "file", vault_dir: {:?} }} }}"#,
            vault.to_str().unwrap()
        ),
    );

    run(parse(&path, &["set", "api-token", "--value", "s3cret"]))
        .await
        .unwrap();
    run(parse(&path, &["get", "api-token"])).await.unwrap();
    run(parse(&path, &["keys"])).await.unwrap();

    // A fresh session sees what the previous process wrote.
    let session = Session::open(&parse(&path, &["keys"])).await.unwrap();
    assert_eq!(session.config.backend.kind, BackendKind::File);
    let value = session
        .call(|store| store.get_text("api-token", None, None))
        .await
        .unwrap();
    assert_eq!(value.expose_secret(), "s3cret");

    run(parse(&path, &["delete", "api-token"])).await.unwrap();
    assert!(run(parse(&path, &["get", "api-token"])).await.is_err());
    run(parse(&path, &["delete", "api-token", "--ignore-missing"]))
        .await
        .unwrap();
    run(parse(&path, &["clear", "--yes"])).await.unwrap();
}

#[tokio::test]
async fn test_simulated_sensor_gates_reads() {
    pin_master_key();
    let dir = TempDir::new().unwrap();
    let vault = dir.path().join("vault");
    let path = write_config(
        &dir,
        &format!(
            r#"{{ backend: {{ kind: "file", vault_dir: {:?} }} }}"#,
            vault.to_str().unwrap()
        ),
    );

    run(parse(
        &path,
        &["--simulate-biometrics", "touch", "set", "pin", "--value", "1234", "--biometrics"],
    ))
    .await
    .unwrap();
    run(parse(&path, &["--simulate-biometrics", "touch", "get", "pin"]))
        .await
        .unwrap();

    let canceled = run(parse(&path, &["--simulate-biometrics", "cancel", "get", "pin"]))
        .await
        .unwrap_err();
    assert!(matches!(
        canceled.downcast_ref::<lockbox_secrets::SecretError>(),
        Some(lockbox_secrets::SecretError::AuthenticationCanceled)
    ));

    let denied = run(parse(&path, &["--simulate-biometrics", "deny", "get", "pin"]))
        .await
        .unwrap_err();
    assert!(matches!(
        denied.downcast_ref::<lockbox_secrets::SecretError>(),
        Some(lockbox_secrets::SecretError::AuthenticationFailed)
    ));
}

#[tokio::test]
async fn test_namespace_override_isolates_entries() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ backend: { kind: "memory" } }"#);

    let cli = parse(&path, &["--namespace", "com.example.other", "keys"]);
    assert!(matches!(cli.command, Commands::Keys { .. }));
    let session = Session::open(&cli).await.unwrap();
    assert_eq!(session.store.namespace(), "com.example.other");

    run(parse(&path, &["capability", "--json"])).await.unwrap();
}

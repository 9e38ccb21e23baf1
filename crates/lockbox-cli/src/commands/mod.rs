//! CLI command implementations.

pub mod config;
pub mod secrets;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use lockbox_core::env::{self, PASSWORD_VAR};
use lockbox_core::{BiometricCapability, Config, SecretString};
use lockbox_secrets::{open_backend, AuthOutcome, Authenticator, ScriptedAuthenticator, SecretStore};
use tracing::debug;

use crate::Cli;

/// Behavior of the simulated biometric sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SimulatedSensor {
    /// Fingerprint sensor that approves every challenge
    Touch,
    /// Face sensor that approves every challenge
    Face,
    /// Sensor that fails every challenge
    Deny,
    /// Sensor whose user cancels every challenge
    Cancel,
}

impl SimulatedSensor {
    fn authenticator(self) -> ScriptedAuthenticator {
        match self {
            Self::Touch => ScriptedAuthenticator::approving(BiometricCapability::TouchEquivalent),
            Self::Face => ScriptedAuthenticator::approving(BiometricCapability::FaceEquivalent),
            Self::Deny => ScriptedAuthenticator::new(
                BiometricCapability::TouchEquivalent,
                AuthOutcome::Failed,
            ),
            Self::Cancel => ScriptedAuthenticator::new(
                BiometricCapability::TouchEquivalent,
                AuthOutcome::Canceled,
            ),
        }
    }
}

/// Load the config file named on the command line, or the default one.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("failed to load {}", path.display()))?
        }
        None => Config::load_or_default()?,
    };
    config.validate()?;
    Ok(config)
}

/// Config with command-line overrides applied.
pub fn effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(kind) = cli.backend {
        config.backend.kind = kind;
    }
    config.validate()?;
    Ok(config)
}

/// Process password: prompted, from the environment, or absent.
///
/// An empty `LOCKBOX_PASSWORD` is kept as an explicit empty password.
fn resolve_password(ask: bool) -> anyhow::Result<Option<SecretString>> {
    if ask {
        let password =
            rpassword::prompt_password("Process password: ").context("failed to read password")?;
        return Ok(Some(SecretString::from(password)));
    }
    Ok(env::get_var_raw(PASSWORD_VAR).map(SecretString::from))
}

/// An opened store plus the config it came from.
pub struct Session {
    pub config: Config,
    pub store: Arc<SecretStore>,
}

impl Session {
    /// Open the configured backend off the async runtime.
    pub async fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = effective_config(cli)?;
        let password = resolve_password(cli.ask_password)?;
        let authenticator: Option<Arc<dyn Authenticator>> = cli
            .simulate_biometrics
            .map(|sensor| Arc::new(sensor.authenticator()) as Arc<dyn Authenticator>);

        let opened = config.clone();
        let store = tokio::task::spawn_blocking(move || {
            let backend = open_backend(&opened, authenticator)?;
            SecretStore::from_config(&opened, backend, password)
        })
        .await
        .context("backend initialization task failed")??;

        debug!(
            backend = store.backend_name(),
            namespace = store.namespace(),
            "session ready"
        );
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    /// Run a store call on the blocking pool.
    pub async fn call<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&SecretStore) -> lockbox_secrets::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("secret store task failed")?;
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use lockbox_core::config::BackendKind;
    use tempfile::TempDir;

    #[test]
    fn test_effective_config_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lockbox.json5");
        std::fs::write(&path, r#"{ namespace: "from-file", backend: { kind: "file" } }"#).unwrap();

        let cli = Cli::try_parse_from([
            "lockbox",
            "keys",
            "--config",
            path.to_str().unwrap(),
            "--backend",
            "memory",
        ])
        .unwrap();
        let config = effective_config(&cli).unwrap();
        assert_eq!(config.namespace, "from-file");
        assert_eq!(config.backend.kind, BackendKind::Memory);
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/lockbox.json5"))).is_err());
    }

    #[test]
    fn test_simulated_sensor_capability() {
        assert_eq!(
            SimulatedSensor::Face.authenticator().capability(),
            BiometricCapability::FaceEquivalent
        );
        assert_eq!(
            SimulatedSensor::Cancel.authenticator().authenticate("p"),
            AuthOutcome::Canceled
        );
    }

    #[tokio::test]
    async fn test_session_round_trip_on_memory_backend() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lockbox.json5");
        std::fs::write(&path, r#"{ backend: { kind: "memory" } }"#).unwrap();
        let cli =
            Cli::try_parse_from(["lockbox", "keys", "--config", path.to_str().unwrap()]).unwrap();

        let session = Session::open(&cli).await.unwrap();
        session
            .call(|store| store.set_default("k", b"v"))
            .await
            .unwrap();
        let value = session
            .call(|store| store.get("k", None, None))
            .await
            .unwrap();
        assert_eq!(value.expose(), b"v");
    }
}

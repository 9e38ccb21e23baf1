//! Configuration loading and persistence.

use super::Config;
use crate::error::ConfigError;
use crate::paths;
use crate::types::validate_sharing_group;
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from the default path, or defaults if absent.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::load_default() {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(path)) => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let path = paths::config_file()?;
        self.save(&path)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 has no serializer; plain JSON is valid JSON5
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolve the vault directory, expanding `~` and falling back to the default.
    pub fn vault_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.backend.vault_dir {
            Some(dir) => Ok(paths::expand_path(dir)),
            None => paths::vault_dir(),
        }
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Namespace
        if self.namespace.trim().is_empty() {
            errors.push("Namespace must not be empty".to_string());
        }

        // 2. Access group entries
        for (i, group) in self.backend.access_groups.iter().enumerate() {
            if let Err(e) = validate_sharing_group(group) {
                errors.push(format!("Access group [{}]: {}", i, e));
            }
        }

        // 3. Default sharing group must be well-formed and entitled
        if let Some(group) = &self.policy.sharing_group {
            if let Err(e) = validate_sharing_group(group) {
                errors.push(format!("Default sharing group: {}", e));
            } else if !self.backend.access_groups.is_empty()
                && !self.backend.access_groups.iter().any(|g| g == group)
            {
                errors.push(format!(
                    "Default sharing group '{}' is not listed in backend.access_groups",
                    group
                ));
            }
        }

        // 4. Log level
        if self.logging.level.trim().is_empty() {
            errors.push("Logging level must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::types::Accessibility;
    use tempfile::TempDir;

    #[test]
    fn test_parse_json5() {
        let config = Config::parse(
            r#"{
                // comments are fine
                namespace: "com.example.app",
                backend: { kind: "memory", access_groups: ["TEAM.shared"] },
                policy: { accessibility: "after_first_unlock", sharing_group: "TEAM.shared" },
            }"#,
        )
        .unwrap();
        assert_eq!(config.namespace, "com.example.app");
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.policy.accessibility, Accessibility::AfterFirstUnlock);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.namespace, "lockbox");
        assert_eq!(config.backend.kind, BackendKind::File);
        assert_eq!(config.logging.level, "info");
        assert!(!config.policy.require_biometrics);
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut config = Config::default();
        config.namespace = " ".to_string();
        config.backend.access_groups = vec!["".to_string(), "ok.group".to_string()];
        config.policy.sharing_group = Some("other.group".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Namespace"));
        assert!(err.contains("Access group [0]"));
        assert!(err.contains("not listed"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("lockbox.json5");

        let mut config = Config::default();
        config.namespace = "saved".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.namespace, "saved");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_missing() {
        let result = Config::load(Path::new("/nonexistent/lockbox.json5"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_vault_dir_override() {
        let mut config = Config::default();
        config.backend.vault_dir = Some(PathBuf::from("/tmp/lockbox-vault"));
        assert_eq!(config.vault_dir().unwrap(), PathBuf::from("/tmp/lockbox-vault"));
    }
}

//! Configuration management commands.

use std::path::{Path, PathBuf};

use clap::Args;
use lockbox_core::config::Config;
use lockbox_core::paths;

use super::effective_config;
use crate::Cli;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key (dot-separated path)
        key: String,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

fn config_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(paths::config_file()?),
    }
}

/// Run the config command.
pub fn run(cli: &Cli, args: &ConfigArgs) -> anyhow::Result<()> {
    match &args.command {
        ConfigCommand::Show => {
            let config = effective_config(cli)?;
            println!("{}", config.to_json5()?);
        }

        ConfigCommand::Get { key } => {
            let config = effective_config(cli)?;
            let json = serde_json::to_value(&config)?;

            let value = key
                .split('.')
                .try_fold(&json, |acc, k| acc.get(k));

            match value {
                Some(v) => println!("{}", serde_json::to_string_pretty(v)?),
                None => anyhow::bail!("Key not found: {}", key),
            }
        }

        ConfigCommand::Path => {
            println!("{}", config_path(cli.config.as_deref())?.display());
        }

        ConfigCommand::Validate => {
            effective_config(cli)?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}

/// Write a default configuration file.
pub fn init(explicit: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = config_path(explicit)?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            path.display()
        );
    }

    Config::default().save(&path)?;
    println!("Created config file: {}", path.display());
    Ok(())
}

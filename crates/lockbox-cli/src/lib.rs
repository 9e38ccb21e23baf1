//! Lockbox command-line interface.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lockbox_core::config::BackendKind;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Lockbox - secure credential store
#[derive(Parser)]
#[command(name = "lockbox")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "LOCKBOX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured namespace
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Override the configured backend (memory, file, keyring, keychain)
    #[arg(short, long, global = true)]
    pub backend: Option<BackendKind>,

    /// Prompt for a process password instead of reading LOCKBOX_PASSWORD
    #[arg(long, global = true)]
    pub ask_password: bool,

    /// Answer biometric challenges from a simulated sensor (memory and file backends)
    #[arg(long, value_enum, global = true)]
    pub simulate_biometrics: Option<commands::SimulatedSensor>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Store a secret
    Set(commands::secrets::SetArgs),

    /// Retrieve a secret
    Get(commands::secrets::GetArgs),

    /// Delete a secret
    Delete(commands::secrets::DeleteArgs),

    /// Delete every secret in the namespace
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List stored keys
    Keys {
        /// Text shown if a biometric challenge is needed
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Show which biometric sensor the backend can gate on
    Capability {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Write a default configuration file
    Init {
        /// Overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show version information
    Version,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins; otherwise `level` applies to the lockbox crates and each
/// `-v` raises it one step. Logs go to stderr so command output stays clean.
pub fn init_tracing(verbose: u8, level: &str, json: bool) {
    let level = match verbose {
        0 => level,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lockbox={level}")));

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Version => {
            println!("lockbox {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Init { force } => commands::config::init(cli.config.as_deref(), force),
        Commands::Config(ref args) => commands::config::run(&cli, args),
        _ => {
            let session = commands::Session::open(&cli).await?;
            match cli.command {
                Commands::Set(args) => commands::secrets::set(&session, args).await,
                Commands::Get(args) => commands::secrets::get(&session, args).await,
                Commands::Delete(args) => commands::secrets::delete(&session, args).await,
                Commands::Clear { yes } => commands::secrets::clear(&session, yes).await,
                Commands::Keys { prompt } => commands::secrets::keys(&session, prompt).await,
                Commands::Capability { json } => {
                    commands::secrets::capability(&session, json).await
                }
                Commands::Version | Commands::Init { .. } | Commands::Config(_) => Ok(()),
            }
        }
    }
}

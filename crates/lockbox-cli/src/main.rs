//! Lockbox CLI entry point.

use clap::Parser;
use lockbox_cli::{commands, init_tracing, run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it loads.
    let (level, json) = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => (config.logging.level, config.logging.json),
        Err(_) => ("info".to_string(), false),
    };
    init_tracing(cli.verbose, &level, json);

    run(cli).await
}

//! # lockbox-core
//!
//! Core types, configuration, and utilities for Lockbox.
//!
//! This crate provides shared functionality used across the Lockbox crates:
//!
//! - **Types**: Access policies and biometric capability values
//! - **Configuration**: Loading, validation, and persistence of the config file
//! - **Utilities**: Path resolution, environment handling, and redacted strings

pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod secret;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use secret::SecretString;
pub use types::*;

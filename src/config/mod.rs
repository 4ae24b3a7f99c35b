//! Typed configuration.
//!
//! Process-level values (connection strings, telemetry) come from
//! environment variables and are loaded once at startup, failing fast if a
//! required one is missing. Queue topology and handler wiring live in a TOML
//! settings file, see [`settings`].

pub mod settings;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;

pub use settings::Settings;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub settings_path: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            settings_path: std::env::var("JOBQ_SETTINGS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("jobq.toml")),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

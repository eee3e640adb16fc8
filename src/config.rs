//! Process configuration.
//!
//! CLI arguments and environment variable handling using clap. Values come
//! from the environment in deployment; flags exist for local runs.

use clap::Parser;
use secrecy::SecretString;

use crate::{DATASTORE_URI_VAR, Result, SESSION_DATA_VAR, error::Error};

/// chatline - resilient messaging-network session runtime
#[derive(Parser, Debug, Clone)]
#[command(name = "chatline")]
#[command(about = "Keeps a bot session on a messaging network alive and dispatches inbound messages")]
pub struct Args {
    /// Durable store connection string. `memory` selects the in-process
    /// store (state is lost on restart).
    #[arg(long, env = DATASTORE_URI_VAR)]
    pub datastore_uri: String,

    /// Database name used when the store is MongoDB
    #[arg(long, env = "DATASTORE_DB", default_value = "chatline")]
    pub datastore_db: String,

    /// Port for the health endpoint
    #[arg(long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Optional base64-encoded credential override bundle
    #[arg(long, env = SESSION_DATA_VAR, hide_env_values = true)]
    session_data: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// The credential override bundle, if one was supplied.
    ///
    /// Empty or whitespace-only values are treated as absent so that
    /// `SESSION_DATA=""` in a unit file behaves like an unset variable.
    #[must_use]
    pub fn session_data(&self) -> Option<SecretString> {
        self.session_data
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.to_owned()))
    }

    /// Whether the in-process memory store was requested.
    #[must_use]
    pub fn wants_memory_store(&self) -> bool {
        self.datastore_uri == "memory"
    }

    pub fn validate(&self) -> Result<()> {
        if self.datastore_uri.trim().is_empty() {
            return Err(Error::config("DATASTORE_URI must not be empty"));
        }
        if !self.wants_memory_store() && !self.datastore_uri.starts_with("mongodb") {
            return Err(Error::config(format!(
                "unsupported DATASTORE_URI scheme: {}",
                self.datastore_uri
            )));
        }
        Ok(())
    }
}

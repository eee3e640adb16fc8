#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod probe;
pub mod server;
pub mod session;
pub mod store;
pub mod transport;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Environment variable holding the durable store connection string.
pub const DATASTORE_URI_VAR: &str = "DATASTORE_URI";

/// Environment variable holding the optional base64 credential override.
pub const SESSION_DATA_VAR: &str = "SESSION_DATA";

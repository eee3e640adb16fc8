//! Durable record storage.
//!
//! Credentials and bot state persist as flat byte records keyed by logical
//! name: one distinguished `creds` record plus one record per signal key
//! identifier. The format of each record is opaque to this crate.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::Result;

/// Key under which identity/session secrets are stored.
pub const CREDS_RECORD: &str = "creds";

/// Prefix for per-peer signal key records.
pub const KEY_RECORD_PREFIX: &str = "key:";

/// Key-value persistence consumed by the credential store.
///
/// Implementations must tolerate rapid repeated writes to the same key;
/// every key rotation on the transport produces a write.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read a record, `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a record, replacing any previous value.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a record. Removing an absent record is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List the keys of all records whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Record key for a named signal key.
#[must_use]
pub fn key_record(name: &str) -> String {
    format!("{KEY_RECORD_PREFIX}{name}")
}

//! Credential storage.
//!
//! Authentication material lives in the durable store as one `creds` record
//! plus one record per signal key. The [`CredentialStore`] owns the in-memory
//! copy; the lifecycle manager borrows it for the duration of one connection
//! attempt and feeds every credential-update event back through [`persist`].
//!
//! [`persist`]: CredentialStore::persist

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::Result;
use crate::store::{CREDS_RECORD, DurableStore, KEY_RECORD_PREFIX, key_record};

/// Authentication material required by the transport.
///
/// Both fields are opaque to this crate beyond their shape. `keys` grows
/// without bound over a session's life, which is why lookups go through the
/// caching wrapper instead of hitting storage each time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Identity and session secrets.
    pub creds: Value,
    /// Per-peer signal/ratchet key material, keyed by record name.
    pub keys: BTreeMap<String, Value>,
}

impl Credentials {
    /// Whether this is a fresh, never-authenticated structure.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.creds.is_null() && self.keys.is_empty()
    }
}

/// Partial update emitted by the transport when key material rotates.
///
/// A `None` entry in `keys` removes that record.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creds: Option<Value>,
    #[serde(default)]
    pub keys: BTreeMap<String, Option<Value>>,
}

/// Loads, overrides, and persists [`Credentials`].
pub struct CredentialStore {
    store: Arc<dyn DurableStore>,
    current: Credentials,
    cache: Arc<DashMap<String, Option<Value>>>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            current: Credentials::default(),
            cache: Arc::new(DashMap::new()),
        }
    }

    /// The in-memory credentials.
    #[must_use]
    pub fn current(&self) -> &Credentials {
        &self.current
    }

    /// Read persisted credentials, or start fresh if none exist yet.
    pub async fn load(&mut self) -> Result<&Credentials> {
        let mut loaded = Credentials::default();

        if let Some(bytes) = self.store.get(CREDS_RECORD).await? {
            loaded.creds = serde_json::from_slice(&bytes)?;
        }

        for record_key in self.store.list(KEY_RECORD_PREFIX).await? {
            let Some(bytes) = self.store.get(&record_key).await? else {
                continue;
            };
            let name = record_key
                .strip_prefix(KEY_RECORD_PREFIX)
                .unwrap_or(&record_key)
                .to_owned();
            loaded.keys.insert(name, serde_json::from_slice(&bytes)?);
        }

        debug!(keys = loaded.keys.len(), fresh = loaded.is_fresh(), "credentials loaded");
        self.current = loaded;
        Ok(&self.current)
    }

    /// Replace in-memory credentials from an externally supplied bundle.
    ///
    /// Strictly best-effort: a bundle that fails base64 decoding, JSON
    /// decoding, or the shape check (both `creds` and `keys` present) is
    /// discarded with a warning and the current credentials stay as they are.
    /// Returns whether the override was applied.
    pub fn apply_override(&mut self, bundle: &SecretString) -> bool {
        let decoded = match STANDARD.decode(bundle.expose_secret()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "credential override is not valid base64, ignoring");
                return false;
            }
        };

        match serde_json::from_slice::<Credentials>(&decoded) {
            Ok(credentials) => {
                info!(keys = credentials.keys.len(), "credential override applied");
                self.cache.clear();
                self.current = credentials;
                true
            }
            Err(e) => {
                warn!(error = %e, "credential override failed structural decode, ignoring");
                false
            }
        }
    }

    /// Write the complete in-memory credential set through to durable
    /// storage.
    ///
    /// Used after an override bundle is accepted, so the next [`load`] (every
    /// connection attempt starts with one) reads the override back instead of
    /// whatever the store held before.
    ///
    /// [`load`]: CredentialStore::load
    pub async fn persist_current(&mut self) -> Result<()> {
        let update = CredentialUpdate {
            creds: Some(self.current.creds.clone()),
            keys: self
                .current
                .keys
                .iter()
                .map(|(name, value)| (name.clone(), Some(value.clone())))
                .collect(),
        };
        self.persist(update).await
    }

    /// Apply a credential update and write it through to durable storage.
    ///
    /// The in-memory copy is updated before any write, so the running session
    /// stays usable even when persistence fails. Safe to call repeatedly with
    /// the same update; replaying it leaves storage unchanged.
    pub async fn persist(&mut self, update: CredentialUpdate) -> Result<()> {
        if let Some(creds) = &update.creds {
            self.current.creds = creds.clone();
        }
        for (name, value) in &update.keys {
            match value {
                Some(v) => {
                    self.current.keys.insert(name.clone(), v.clone());
                }
                None => {
                    self.current.keys.remove(name);
                }
            }
            self.cache.insert(name.clone(), value.clone());
        }

        if let Some(creds) = &update.creds {
            let bytes = serde_json::to_vec(creds)?;
            self.store.put(CREDS_RECORD, &bytes).await?;
        }
        for (name, value) in &update.keys {
            let record = key_record(name);
            match value {
                Some(v) => self.store.put(&record, &serde_json::to_vec(v)?).await?,
                None => self.store.delete(&record).await?,
            }
        }
        Ok(())
    }

    /// Caching wrapper around key material for one session.
    #[must_use]
    pub fn key_cache(&self) -> SignalKeyCache {
        SignalKeyCache {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
        }
    }
}

/// Read-through cache over signal key records.
///
/// Handed to the transport provider so repeated key lookups within one
/// session skip durable storage. Misses are cached too; [`CredentialStore::persist`]
/// refreshes entries when keys rotate.
#[derive(Clone)]
pub struct SignalKeyCache {
    store: Arc<dyn DurableStore>,
    cache: Arc<DashMap<String, Option<Value>>>,
}

impl SignalKeyCache {
    pub async fn get(&self, name: &str) -> Result<Option<Value>> {
        if let Some(hit) = self.cache.get(name) {
            return Ok(hit.value().clone());
        }
        let fetched = match self.store.get(&key_record(name)).await? {
            Some(bytes) => Some(serde_json::from_slice(&bytes)?),
            None => None,
        };
        self.cache.insert(name.to_owned(), fetched.clone());
        Ok(fetched)
    }

    /// Number of cached entries, hits and misses both.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

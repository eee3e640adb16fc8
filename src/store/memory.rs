//! In-process store used by tests and `DATASTORE_URI=memory` runs.

use async_trait::async_trait;
use dashmap::DashMap;

use super::DurableStore;
use crate::Result;

/// Non-durable [`DurableStore`] backed by a concurrent map.
///
/// State does not survive a restart; a bot running against this store will
/// re-authenticate from scratch every boot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.records.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.key().starts_with(prefix))
            .map(|r| r.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "panicking is the desired test behavior")]

    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("creds", b"secret").await.unwrap();

        assert_eq!(store.get("creds").await.unwrap(), Some(b"secret".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put("key:a", b"1").await.unwrap();

        store.delete("key:a").await.unwrap();
        store.delete("key:a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryStore::new();
        store.put("creds", b"c").await.unwrap();
        store.put("key:session:1", b"a").await.unwrap();
        store.put("key:sender:2", b"b").await.unwrap();

        let mut keys = store.list("key:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["key:sender:2", "key:session:1"]);
    }
}

//! MongoDB-backed record store.

use async_trait::async_trait;
use bson::{Binary, DateTime, doc, spec::BinarySubtype};
use futures::TryStreamExt as _;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::DurableStore;
use crate::Result;
use crate::error::Error;

const COLLECTION: &str = "records";

/// One persisted record. `_id` is the logical record name, so lookups and
/// upserts hit the collection's primary index.
#[derive(Debug, Serialize, Deserialize)]
struct RecordDoc {
    #[serde(rename = "_id")]
    key: String,
    value: Binary,
    updated_at: DateTime,
}

/// [`DurableStore`] on a MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    records: Collection<RecordDoc>,
}

impl MongoStore {
    /// Connect and verify the deployment with a ping.
    ///
    /// An unreachable server fails here rather than on first use; the caller
    /// treats that as fatal at boot.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        info!(db = db_name, "connecting to MongoDB");

        // Bound server selection so boot fails fast instead of hanging on an
        // unreachable replica set.
        let timeout_uri = if uri.contains('?') {
            format!("{uri}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        } else {
            format!("{uri}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        };

        let client = Client::with_uri_str(&timeout_uri).await?;
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::storage(format!("MongoDB unreachable: {e}")))?;

        info!(db = db_name, "MongoDB connected");
        Ok(Self {
            records: db.collection(COLLECTION),
            client,
        })
    }

    /// Disconnect, flushing in-flight operations.
    pub async fn disconnect(self) {
        self.client.shutdown().await;
    }
}

#[async_trait]
impl DurableStore for MongoStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let found = self.records.find_one(doc! { "_id": key }).await?;
        Ok(found.map(|r| r.value.bytes))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let record = RecordDoc {
            key: key.to_owned(),
            value: Binary {
                subtype: BinarySubtype::Generic,
                bytes: value.to_vec(),
            },
            updated_at: DateTime::now(),
        };
        self.records
            .replace_one(doc! { "_id": key }, record)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.records.delete_one(doc! { "_id": key }).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Record names contain no regex metacharacters ("creds", "key:...").
        let cursor = self
            .records
            .find(doc! { "_id": { "$regex": format!("^{prefix}") } })
            .await?;
        let records: Vec<RecordDoc> = cursor.try_collect().await?;
        Ok(records.into_iter().map(|r| r.key).collect())
    }
}

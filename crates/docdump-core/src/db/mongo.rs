//! MongoDB database handle.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database};
use tracing::debug;

use super::{DocumentDatabase, DocumentStream};
use crate::error::DatabaseError;
use crate::{Error, Result};

/// Database handle backed by the official MongoDB driver
#[derive(Debug, Clone)]
pub struct MongoDatabase {
    name: String,
    database: Database,
}

impl MongoDatabase {
    /// Connect to a deployment and bind the handle to one database
    pub async fn connect(uri: &str, name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed {
                uri: uri.to_string(),
                message: e.to_string(),
            })
        })?;
        Ok(Self::from_database(client.database(name)))
    }

    /// Wrap an already configured driver database
    pub fn from_database(database: Database) -> Self {
        Self {
            name: database.name().to_string(),
            database,
        }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }

    async fn command(&self, name: &str, command: Document) -> Result<Document> {
        self.database
            .run_command(command, None)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::CommandFailed {
                    command: name.to_string(),
                    message: e.to_string(),
                })
            })
    }
}

#[async_trait]
impl DocumentDatabase for MongoDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.database.list_collection_names(None).await?)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let names = self
            .database
            .list_collection_names(doc! { "name": collection })
            .await?;
        Ok(!names.is_empty())
    }

    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        let cursor = self.collection(collection).find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }

    /// Servers since 4.2 no longer offer `parallelCollectionScan`, so the
    /// collection is split into `_id`-ordered skip/limit ranges instead.
    async fn parallel_scan(
        &self,
        collection: &str,
        num_cursors: u16,
    ) -> Result<Vec<DocumentStream>> {
        let handle = self.collection(collection);
        let total = handle.count_documents(None, None).await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let cursors = u64::from(num_cursors.max(1)).min(total);
        let chunk = total.div_ceil(cursors);
        debug!(
            "Scanning {} with {} cursors of up to {} documents",
            collection, cursors, chunk
        );

        let mut streams = Vec::with_capacity(cursors as usize);
        for i in 0..cursors {
            let options = FindOptions::builder()
                .sort(doc! { "_id": 1 })
                .skip(i * chunk)
                .limit(chunk as i64)
                .build();
            let cursor = handle.find(None, options).await?;
            let name = collection.to_string();
            let stream: DocumentStream = cursor
                .map_err(move |e| {
                    Error::Database(DatabaseError::Cursor {
                        collection: name.clone(),
                        message: e.to_string(),
                    })
                })
                .boxed();
            streams.push(stream);
        }
        Ok(streams)
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<Document>> {
        let response = self
            .command("listIndexes", doc! { "listIndexes": collection })
            .await?;

        let batch = response
            .get_document("cursor")
            .and_then(|cursor| cursor.get_array("firstBatch"))
            .map_err(|e| {
                Error::Database(DatabaseError::CommandFailed {
                    command: "listIndexes".to_string(),
                    message: e.to_string(),
                })
            })?;

        Ok(batch
            .iter()
            .filter_map(|entry| match entry {
                Bson::Document(index) => Some(index.clone()),
                _ => None,
            })
            .collect())
    }

    async fn create_index(&self, collection: &str, index: Document) -> Result<()> {
        let mut index = index;
        index.remove("ns");
        self.command(
            "createIndexes",
            doc! { "createIndexes": collection, "indexes": [index] },
        )
        .await?;
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        if self.collection_exists(collection).await? {
            return Err(Error::CollectionExists(collection.to_string()));
        }
        Ok(self.database.create_collection(collection, None).await?)
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        Ok(self.collection(collection).drop(None).await?)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let result = self.collection(collection).insert_many(documents, None).await?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        Ok(self.collection(collection).count_documents(None, None).await?)
    }
}

//! In-memory document database for testing and embedding.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};

use super::{is_primary_key_index, DocumentDatabase, DocumentStream};
use crate::error::DatabaseError;
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct MemoryCollection {
    documents: Vec<Document>,
    indexes: Vec<Document>,
}

impl MemoryCollection {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![doc! { "v": 2, "key": { "_id": 1 }, "name": "_id_" }],
        }
    }
}

/// In-memory database handle
///
/// Keeps every collection in a map guarded by a read-write lock. Mirrors
/// the server behaviours the engine relies on: the implicit `_id_` index,
/// generated ObjectIds, duplicate-key rejection, and idempotent drops.
/// Reads against a collection can be made to fail with [`fail_reads`]
/// to exercise per-collection error paths.
///
/// [`fail_reads`]: MemoryDatabase::fail_reads
pub struct MemoryDatabase {
    name: String,
    collections: RwLock<BTreeMap<String, MemoryCollection>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryDatabase {
    /// Create an empty database with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(BTreeMap::new()),
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Make every read of `collection` fail until [`heal`](Self::heal) is called
    pub fn fail_reads(&self, collection: &str) {
        self.failing.write().insert(collection.to_string());
    }

    /// Clear an injected read failure
    pub fn heal(&self, collection: &str) {
        self.failing.write().remove(collection);
    }

    /// Snapshot of every document in a collection, in insertion order
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    fn check_readable(&self, collection: &str, command: &str) -> Result<()> {
        if self.failing.read().contains(collection) {
            return Err(Error::Database(DatabaseError::CommandFailed {
                command: command.to_string(),
                message: format!("injected failure on {}", collection),
            }));
        }
        Ok(())
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

/// Key used for duplicate `_id` detection; numerically equal ids collide
/// whatever their numeric type, as they do on the server.
fn id_key(id: &Bson) -> String {
    match id {
        Bson::Int32(n) => format!("number:{}", *n as f64),
        Bson::Int64(n) => format!("number:{}", *n as f64),
        Bson::Double(n) => format!("number:{}", n),
        other => other.to_string(),
    }
}

fn index_name(index: &Document) -> Result<String> {
    if let Ok(name) = index.get_str("name") {
        return Ok(name.to_string());
    }
    let key = index.get_document("key").map_err(|_| {
        Error::Database(DatabaseError::CommandFailed {
            command: "createIndexes".to_string(),
            message: "index definition has no key".to_string(),
        })
    })?;
    let parts: Vec<String> = key
        .iter()
        .map(|(field, direction)| match direction {
            Bson::String(kind) => format!("{}_{}", field, kind),
            Bson::Int32(n) => format!("{}_{}", field, n),
            Bson::Int64(n) => format!("{}_{}", field, n),
            Bson::Double(n) => format!("{}_{}", field, n),
            other => format!("{}_{}", field, other),
        })
        .collect();
    Ok(parts.join("_"))
}

#[async_trait]
impl DocumentDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.read().contains_key(collection))
    }

    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        self.check_readable(collection, "find")?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| {
                c.documents
                    .iter()
                    .filter(|d| matches(d, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn parallel_scan(
        &self,
        collection: &str,
        num_cursors: u16,
    ) -> Result<Vec<DocumentStream>> {
        self.check_readable(collection, "parallelCollectionScan")?;
        let documents = self.documents(collection);
        let cursors = (num_cursors.max(1) as usize).min(documents.len());

        let mut partitions: Vec<Vec<Result<Document>>> = (0..cursors).map(|_| Vec::new()).collect();
        for (i, document) in documents.into_iter().enumerate() {
            partitions[i % cursors].push(Ok(document));
        }

        Ok(partitions
            .into_iter()
            .map(|p| -> DocumentStream { Box::pin(futures::stream::iter(p)) })
            .collect())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<Document>> {
        self.check_readable(collection, "listIndexes")?;
        self.collections
            .read()
            .get(collection)
            .map(|c| c.indexes.clone())
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))
    }

    async fn create_index(&self, collection: &str, index: Document) -> Result<()> {
        let name = index_name(&index)?;
        let mut index = index;
        index.insert("name", name.clone());

        let mut collections = self.collections.write();
        let target = collections
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        if is_primary_key_index(&index) {
            return Ok(());
        }
        if let Some(existing) = target
            .indexes
            .iter_mut()
            .find(|i| i.get_str("name").ok() == Some(name.as_str()))
        {
            *existing = index;
        } else {
            target.indexes.push(index);
        }
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(collection) {
            return Err(Error::CollectionExists(collection.to_string()));
        }
        collections.insert(collection.to_string(), MemoryCollection::new());
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collections.write().remove(collection);
        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        let mut collections = self.collections.write();
        let target = collections
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        let mut seen: HashSet<String> = target
            .documents
            .iter()
            .filter_map(|d| d.get("_id").map(id_key))
            .collect();

        let mut prepared = Vec::with_capacity(documents.len());
        for mut document in documents {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            let id = document
                .get("_id")
                .map(|id| id.to_string())
                .unwrap_or_default();
            if !seen.insert(document.get("_id").map(id_key).unwrap_or_default()) {
                return Err(Error::Database(DatabaseError::DuplicateKey {
                    collection: collection.to_string(),
                    id,
                }));
            }
            prepared.push(document);
        }

        let inserted = prepared.len() as u64;
        target.documents.extend(prepared);
        Ok(inserted)
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.documents.len() as u64)
            .unwrap_or(0))
    }
}

//! Index metadata capture and replay.
//!
//! Each collection's index definitions are kept in
//! `<root>/<database>/.metadata/<collection>` as a JSON array. The implicit
//! `_id_` index is never written and never replayed.

use bson::Document;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::codec::{document_to_json, json_to_document};
use crate::db::{is_primary_key_index, DocumentDatabase};
use crate::fan_out::{FanIn, FanOut};
use crate::layout::DumpTree;
use crate::{Error, Result};

/// Ordered index definitions of one collection, primary key excluded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexDescriptor {
    indexes: Vec<Document>,
}

impl IndexDescriptor {
    /// Build a descriptor from raw definitions, dropping the primary key
    pub fn from_indexes(indexes: Vec<Document>) -> Self {
        Self {
            indexes: indexes
                .into_iter()
                .filter(|index| !is_primary_key_index(index))
                .collect(),
        }
    }

    pub fn indexes(&self) -> &[Document] {
        &self.indexes
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Serialize as a pretty-printed JSON array
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let array = Value::Array(self.indexes.iter().map(document_to_json).collect());
        Ok(serde_json::to_vec_pretty(&array)?)
    }

    /// Parse a JSON array written by [`to_json`](Self::to_json)
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Array(entries) = value else {
            return Err(Error::Metadata("index list is not a JSON array".to_string()));
        };

        let mut indexes = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Value::Object(map) => indexes.push(json_to_document(map)),
                other => {
                    return Err(Error::Metadata(format!(
                        "index entry is not an object: {}",
                        other
                    )))
                }
            }
        }
        Ok(Self::from_indexes(indexes))
    }
}

/// Whether index metadata is captured and replayed for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataPolicy {
    enabled: bool,
}

impl MetadataPolicy {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Write the index list of `collection` into the dump tree.
    ///
    /// Failing to fetch the indexes is logged and leaves no metadata file;
    /// only a failed write is returned as an error.
    pub async fn capture(
        &self,
        db: &dyn DocumentDatabase,
        tree: &DumpTree,
        collection: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let indexes = match db.list_indexes(collection).await {
            Ok(indexes) => indexes,
            Err(e) => {
                warn!("Failed to fetch indexes of {}: {}", collection, e);
                return Ok(());
            }
        };

        let descriptor = IndexDescriptor::from_indexes(indexes);
        let path = tree.metadata_file(db.name(), collection);
        fs::write(&path, descriptor.to_json()?).await?;
        debug!(
            "Saved {} index definitions of {} to {}",
            descriptor.len(),
            collection,
            path.display()
        );
        Ok(())
    }

    /// Recreate on `target` every index listed in `metadata_file`.
    ///
    /// Returns once every index creation has reported. A missing or
    /// unreadable file is logged and treated as an empty list.
    pub async fn replay(
        &self,
        db: &dyn DocumentDatabase,
        metadata_file: &Path,
        target: &str,
    ) -> FanIn {
        if !self.enabled {
            return FanIn::default();
        }

        let descriptor = match read_descriptor(metadata_file).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                warn!("Missing index metadata at {}", metadata_file.display());
                return FanIn::default();
            }
            Err(e) => {
                warn!(
                    "Unreadable index metadata at {}: {}",
                    metadata_file.display(),
                    e
                );
                return FanIn::default();
            }
        };

        info!("Replaying {} indexes on {}", descriptor.len(), target);
        let creations = descriptor.indexes().iter().cloned().map(|index| {
            let name = index.get_str("name").unwrap_or("<unnamed>").to_string();
            (name, db.create_index(target, index))
        });
        FanOut::new("index creations").run(creations).await
    }
}

async fn read_descriptor(path: &Path) -> Result<Option<IndexDescriptor>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(IndexDescriptor::from_json(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

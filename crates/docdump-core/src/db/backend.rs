//! Database handle trait definition.

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;

use crate::Result;

/// One independent cursor of a parallel scan.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Name of the index every collection carries on `_id`.
pub const PRIMARY_KEY_INDEX: &str = "_id_";

/// Trait for document database handles
///
/// A handle is bound to one database. It is shared read-only across every
/// concurrent job of a run, so implementations must be safe to call from
/// many futures at once.
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    /// Name of the database this handle is bound to
    fn name(&self) -> &str;

    /// List the names of every collection, reserved ones included
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Check whether a collection exists
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Run a match query and materialize every result
    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>>;

    /// Open up to `num_cursors` independent cursors that together cover
    /// the whole collection exactly once
    async fn parallel_scan(&self, collection: &str, num_cursors: u16)
        -> Result<Vec<DocumentStream>>;

    /// Fetch the raw index definitions of a collection, primary key included
    async fn list_indexes(&self, collection: &str) -> Result<Vec<Document>>;

    /// Create one index from a raw index definition
    async fn create_index(&self, collection: &str, index: Document) -> Result<()>;

    /// Create an empty collection
    async fn create_collection(&self, collection: &str) -> Result<()>;

    /// Drop a collection; dropping a missing collection succeeds
    async fn drop_collection(&self, collection: &str) -> Result<()>;

    /// Insert a batch of documents, returning how many were inserted
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64>;

    /// Count the documents of a collection
    async fn count_documents(&self, collection: &str) -> Result<u64>;
}

/// Whether a raw index definition describes the implicit `_id` index.
pub fn is_primary_key_index(index: &Document) -> bool {
    if let Ok(name) = index.get_str("name") {
        return name == PRIMARY_KEY_INDEX;
    }
    match index.get_document("key") {
        Ok(key) => key.len() == 1 && key.contains_key("_id"),
        Err(_) => false,
    }
}

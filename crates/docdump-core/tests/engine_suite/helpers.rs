//! Test helper utilities.
//!
//! Seeded databases, callback counters and directory snapshots shared by
//! the engine tests.

use bson::{doc, Document};
use docdump_core::{
    BackupConfig, BackupEngine, BackupOptions, BackupReport, DocumentDatabase, MemoryDatabase,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Generate `count` order documents with string ids `order-0`, `order-1`, ...
pub fn generate_orders(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            doc! {
                "_id": format!("order-{}", i),
                "sku": format!("sku-{}", i % 3),
                "qty": i as i32 + 1,
            }
        })
        .collect()
}

/// A `shop` database with 3 orders, an empty `customers` collection and a
/// secondary index on `orders.sku`.
pub async fn seeded_shop() -> Arc<MemoryDatabase> {
    let db = Arc::new(MemoryDatabase::new("shop"));
    db.insert_many("orders", generate_orders(3)).await.unwrap();
    db.create_collection("customers").await.unwrap();
    db.create_index("orders", doc! { "key": { "sku": 1 }, "name": "sku_1" })
        .await
        .unwrap();
    db
}

/// Counter incremented by every completion callback built from it
#[derive(Clone, Default)]
pub struct FireCounter(Arc<AtomicUsize>);

impl FireCounter {
    pub fn callback(&self) -> impl FnOnce() + Send + 'static {
        let counter = self.0.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Every regular file under `root`, keyed by its path relative to `root`
pub fn snapshot_files(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                files.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    files
}

/// Names of the directories directly under `dir`, sorted
pub fn subdirectories(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Archive `collection` of `db` as `<root>/<archive>`
pub async fn archive_collection(
    db: Arc<MemoryDatabase>,
    root: &Path,
    staging: &Path,
    archive: &str,
    collection: &str,
) -> BackupReport {
    let config = BackupConfig::builder()
        .database(db)
        .options(BackupOptions {
            root: Some(root.to_path_buf()),
            collections: Some(vec![collection.to_string()]),
            archive: Some(archive.to_string()),
            metadata: true,
            staging_dir: Some(staging.to_path_buf()),
            ..Default::default()
        })
        .build()
        .unwrap();
    let report = BackupEngine::new(config).run().await;
    assert!(report.completed, "{}", report);
    report
}

/// Ids of the documents of `collection`, sorted
pub fn document_ids(db: &MemoryDatabase, collection: &str) -> Vec<String> {
    let mut ids: Vec<String> = db
        .documents(collection)
        .iter()
        .map(|d| d.get("_id").map(|id| id.to_string()).unwrap_or_default())
        .collect();
    ids.sort();
    ids
}

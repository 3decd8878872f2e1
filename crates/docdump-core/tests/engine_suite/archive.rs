//! Archive packaging tests.

use docdump_core::archive::{pack, unpack, ArchiveDestination, ArchiveSource};
use docdump_core::{list_archives, BackupConfig, BackupEngine, BackupOptions, CodecKind};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use super::helpers::{seeded_shop, snapshot_files, subdirectories, FireCounter};

/// Write sink whose bytes stay readable after the engine drops it
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn archive_roundtrip_is_byte_identical() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("dump");
    let config = BackupConfig::builder()
        .database(seeded_shop().await)
        .options(BackupOptions {
            root: Some(root.clone()),
            codec: CodecKind::Json,
            metadata: true,
            ..Default::default()
        })
        .build()
        .unwrap();
    let report = BackupEngine::new(config).run().await;
    assert!(report.completed);

    let archive = temp_dir.path().join("20200115-093000-shop.tar.gz");
    pack(&root.join("shop"), ArchiveDestination::File(archive.clone()))
        .await
        .unwrap();

    let extracted = temp_dir.path().join("extracted");
    std::fs::create_dir_all(&extracted).unwrap();
    unpack(ArchiveSource::File(archive), &extracted)
        .await
        .unwrap();

    let original = snapshot_files(&root);
    assert!(!original.is_empty());
    assert_eq!(snapshot_files(&extracted), original);
    assert!(extracted.join("shop").join("customers").is_dir());
}

#[tokio::test]
async fn backup_streams_archive_to_sink() {
    let temp_dir = TempDir::new().unwrap();
    let sink = SharedBuffer::default();
    let fired = FireCounter::default();

    let config = BackupConfig::builder()
        .database(seeded_shop().await)
        .options(BackupOptions {
            staging_dir: Some(temp_dir.path().join("staging")),
            ..Default::default()
        })
        .stream(sink.clone())
        .on_complete(fired.callback())
        .build()
        .unwrap();
    let report = BackupEngine::new(config).run().await;

    assert!(report.completed);
    assert!(report.streamed);
    assert_eq!(report.archive, None);
    assert_eq!(fired.count(), 1);

    let bytes = sink.0.lock().unwrap().clone();
    assert!(!bytes.is_empty());
    let extracted = temp_dir.path().join("extracted");
    std::fs::create_dir_all(&extracted).unwrap();
    unpack(ArchiveSource::Reader(Box::new(Cursor::new(bytes))), &extracted)
        .await
        .unwrap();
    let files = snapshot_files(&extracted.join("shop").join("orders"));
    assert_eq!(files.len(), 3);

    // staging tree removed after packing
    let staging = std::fs::read_dir(temp_dir.path().join("staging"))
        .unwrap()
        .count();
    assert_eq!(staging, 0);
}

#[tokio::test]
async fn backup_archive_lands_in_root_and_is_listed() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("dump");
    let config = BackupConfig::builder()
        .database(seeded_shop().await)
        .options(BackupOptions {
            root: Some(root.clone()),
            archive: Some("auto".to_string()),
            staging_dir: Some(temp_dir.path().join("staging")),
            ..Default::default()
        })
        .build()
        .unwrap();
    let report = BackupEngine::new(config).run().await;

    let archive = report.archive.clone().unwrap();
    assert!(archive.is_file());
    assert!(!root.join("shop").exists());

    let listed = list_archives(&root).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].path, archive);
    assert_eq!(listed[0].name.database(), Some("shop"));
}

#[tokio::test]
async fn leftover_staging_tree_is_not_archived() {
    let temp_dir = TempDir::new().unwrap();
    let staging = temp_dir.path().join("staging");
    let leftover = staging
        .join("docdump-20200115-093000-shop")
        .join("shop")
        .join("zombie");
    std::fs::create_dir_all(&leftover).unwrap();
    std::fs::write(leftover.join("1.bson"), b"stale").unwrap();

    let config = BackupConfig::builder()
        .database(seeded_shop().await)
        .options(BackupOptions {
            root: Some(temp_dir.path().to_path_buf()),
            collections: Some(vec!["orders".to_string()]),
            archive: Some("20200115-093000-shop.tar.gz".to_string()),
            staging_dir: Some(staging.clone()),
            ..Default::default()
        })
        .build()
        .unwrap();
    let report = BackupEngine::new(config).run().await;
    assert!(report.completed, "{}", report);

    let out = temp_dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    unpack(
        ArchiveSource::File(temp_dir.path().join("20200115-093000-shop.tar.gz")),
        &out,
    )
    .await
    .unwrap();
    assert_eq!(subdirectories(&out.join("shop")), vec!["orders"]);
    assert!(leftover.join("1.bson").is_file());
}

#[tokio::test]
async fn failed_pack_keeps_tree_and_fires_callback() {
    let temp_dir = TempDir::new().unwrap();
    // a directory squatting on the archive path makes the final rename fail
    std::fs::create_dir_all(temp_dir.path().join("20200115-093000-shop.tar.gz").join("x"))
        .unwrap();
    let fired = FireCounter::default();

    let config = BackupConfig::builder()
        .database(seeded_shop().await)
        .options(BackupOptions {
            root: Some(temp_dir.path().to_path_buf()),
            archive: Some("20200115-093000-shop.tar.gz".to_string()),
            staging_dir: Some(temp_dir.path().join("staging")),
            ..Default::default()
        })
        .on_complete(fired.callback())
        .build()
        .unwrap();
    let report = BackupEngine::new(config).run().await;

    assert!(!report.completed);
    assert_eq!(fired.count(), 1);
    assert!(report.archive.is_none());
    let tree = report.tree.clone().unwrap();
    assert!(tree.starts_with(temp_dir.path().join("staging")));
    assert_eq!(subdirectories(&tree.join("shop")), vec!["customers", "orders"]);
    assert_eq!(std::fs::read_dir(tree.join("shop").join("orders")).unwrap().count(), 3);
}

//! Dump tree layout tests.

use docdump_core::layout::{collection_dirs, ensure_dir, first_directory, remove_tree};
use docdump_core::DumpTree;
use tempfile::TempDir;

use super::helpers::snapshot_files;

// ============================================================================
// ensure_dir
// ============================================================================

#[tokio::test]
async fn ensure_dir_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("root").join("shop");

    let first = ensure_dir(&path).await.unwrap();
    std::fs::write(path.join("keep.bson"), b"data").unwrap();
    let second = ensure_dir(&path).await.unwrap();

    assert_eq!(first, second);
    assert!(path.is_dir());
    assert_eq!(std::fs::read(path.join("keep.bson")).unwrap(), b"data");
}

#[tokio::test]
async fn ensure_dir_replaces_a_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("shop");
    std::fs::write(&path, b"not a directory").unwrap();

    ensure_dir(&path).await.unwrap();
    assert!(path.is_dir());
}

// ============================================================================
// remove_tree
// ============================================================================

#[tokio::test]
async fn remove_tree_clears_every_layer_and_keeps_root() {
    let temp_dir = TempDir::new().unwrap();
    let tree = DumpTree::new(temp_dir.path());

    for collection in ["orders", "customers"] {
        let dir = tree.collection_dir("shop", collection);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(tree.document_path("shop", collection, "1", "bson"), b"x").unwrap();
    }
    std::fs::create_dir_all(tree.metadata_dir("shop")).unwrap();
    std::fs::write(tree.metadata_file("shop", "orders"), b"[]").unwrap();

    remove_tree(temp_dir.path()).await.unwrap();

    assert!(temp_dir.path().is_dir());
    assert!(!tree.database_dir("shop").exists());
    assert!(snapshot_files(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn remove_tree_tolerates_missing_layers() {
    let temp_dir = TempDir::new().unwrap();
    remove_tree(&temp_dir.path().join("never-created"))
        .await
        .unwrap();

    let tree = DumpTree::new(temp_dir.path());
    std::fs::create_dir_all(tree.database_dir("shop")).unwrap();
    remove_tree(temp_dir.path()).await.unwrap();
    remove_tree(temp_dir.path()).await.unwrap();
}

// ============================================================================
// Directory discovery
// ============================================================================

#[tokio::test]
async fn collection_dirs_skip_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let tree = DumpTree::new(temp_dir.path());
    for dir in ["orders", "customers", ".metadata"] {
        std::fs::create_dir_all(tree.database_dir("shop").join(dir)).unwrap();
    }

    let names = collection_dirs(&tree.database_dir("shop")).await.unwrap();
    assert_eq!(names, vec!["customers", "orders"]);

    let first = first_directory(temp_dir.path()).await.unwrap();
    assert_eq!(first, Some(tree.database_dir("shop")));
}

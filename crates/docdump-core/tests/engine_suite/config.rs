//! Run file parsing tests.

use docdump_core::{CodecKind, Config, Error, Mode};

#[test]
fn parses_backup_run_file_with_defaults() {
    let yaml = r#"
mode: backup
database:
  uri: mongodb://localhost:27017
  name: shop
backup:
  root: /var/backups/docdump
  archive: auto
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.mode, Mode::Backup);

    let backup = config.backup.unwrap();
    assert_eq!(backup.codec, CodecKind::Bson);
    assert_eq!(backup.num_cursors, 0);
    assert_eq!(backup.max_concurrent_collections, 8);
    assert!(!backup.metadata);
    assert!(backup.collections.is_none());
}

#[test]
fn parses_restore_run_file() {
    let yaml = r#"
mode: restore
database:
  uri: mongodb://localhost:27017
  name: shop
restore:
  root: /var/backups/docdump
  archive: 20200115-093000-shop.tar.gz
  collection: orders_copy
  new_collection: true
  codec: json
  metadata: true
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let restore = config.restore.unwrap();
    assert_eq!(restore.collection, "orders_copy");
    assert!(restore.new_collection);
    assert_eq!(restore.codec, CodecKind::Json);
}

#[test]
fn rejects_mode_without_options() {
    let yaml = r#"
mode: restore
database:
  uri: mongodb://localhost:27017
  name: shop
"#;
    assert!(matches!(Config::from_yaml(yaml), Err(Error::Config(_))));
}

#[test]
fn rejects_invalid_values() {
    let zero_window = r#"
mode: backup
database: { uri: "mongodb://localhost", name: shop }
backup: { root: /tmp, max_concurrent_collections: 0 }
"#;
    assert!(matches!(Config::from_yaml(zero_window), Err(Error::Config(_))));

    let bad_name = r#"
mode: backup
database: { uri: "mongodb://localhost", name: "a/b" }
backup: { root: /tmp }
"#;
    assert!(matches!(Config::from_yaml(bad_name), Err(Error::Config(_))));

    let unknown_codec = r#"
mode: backup
database: { uri: "mongodb://localhost", name: shop }
backup: { root: /tmp, codec: xml }
"#;
    assert!(matches!(
        Config::from_yaml(unknown_codec),
        Err(Error::Serialization(_))
    ));
}

//! On-disk dump tree layout.
//!
//! A dump tree is rooted at a configurable directory:
//!
//! ```text
//! <root>/<database>/<collection>/<document-id>.<ext>
//! <root>/<database>/.metadata/<collection>
//! ```
//!
//! Other tooling reads this layout directly, so the shape is fixed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Name of the per-database directory holding index metadata
pub const METADATA_DIR: &str = ".metadata";

/// Path helpers for one dump tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpTree {
    root: PathBuf,
}

impl DumpTree {
    /// Create a dump tree rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_dir(&self, database: &str) -> PathBuf {
        self.root.join(database)
    }

    pub fn collection_dir(&self, database: &str, collection: &str) -> PathBuf {
        self.database_dir(database).join(collection)
    }

    pub fn metadata_dir(&self, database: &str) -> PathBuf {
        self.database_dir(database).join(METADATA_DIR)
    }

    pub fn metadata_file(&self, database: &str, collection: &str) -> PathBuf {
        self.metadata_dir(database).join(collection)
    }

    pub fn document_path(
        &self,
        database: &str,
        collection: &str,
        document_id: &str,
        extension: &str,
    ) -> PathBuf {
        self.collection_dir(database, collection)
            .join(format!("{}.{}", document_id, extension))
    }
}

/// Check that a database or collection name is usable as one path component.
pub fn validate_component(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidName(format!("'{}'", name)));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(Error::InvalidName(format!(
            "'{}' contains a path separator",
            name
        )));
    }
    Ok(())
}

/// Make sure `path` is a directory.
///
/// A missing directory is created. A non-directory occupying the path is
/// unlinked and replaced. An existing directory is left untouched.
pub async fn ensure_dir(path: &Path) -> Result<PathBuf> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            debug!("Directory {} already present", path.display());
        }
        Ok(_) => {
            warn!("Unlinking non-directory at {}", path.display());
            fs::remove_file(path).await?;
            info!("Creating directory {}", path.display());
            fs::create_dir_all(path).await?;
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Creating directory {}", path.display());
            fs::create_dir_all(path).await?;
        }
        Err(e) => return Err(Error::Io(e)),
    }
    Ok(path.to_path_buf())
}

/// Delete every database → collection → document layer under `root`.
///
/// The `.metadata` directory of each database is removed without being
/// treated as a collection. Entries that disappear while the walk is in
/// progress are ignored; any other failure is returned. `root` itself is
/// kept.
pub async fn remove_tree(root: &Path) -> Result<()> {
    for database in list_dirs(root).await? {
        for entry in list_dirs(&database).await? {
            remove_files(&entry).await?;
            remove_dir(&entry).await?;
        }
        remove_files(&database).await?;
        remove_dir(&database).await?;
        debug!("Removed database tree {}", database.display());
    }
    Ok(())
}

/// Names of the collection directories of one database directory, sorted.
pub async fn collection_dirs(database_dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = list_dirs(database_dir)
        .await?
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .filter(|n| n != METADATA_DIR)
        .collect();
    names.sort();
    Ok(names)
}

/// First directory entry found directly under `path`, in name order.
pub async fn first_directory(path: &Path) -> Result<Option<PathBuf>> {
    let mut dirs = list_dirs(path).await?;
    dirs.sort();
    Ok(dirs.into_iter().next())
}

async fn list_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        match entry.file_type().await {
            Ok(kind) if kind.is_dir() => dirs.push(entry.path()),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(dirs)
}

async fn remove_files(dir: &Path) -> Result<()> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Io(e)),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match entry.file_type().await {
            Ok(kind) if kind.is_dir() => continue,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::Io(e)),
        }
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}

async fn remove_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

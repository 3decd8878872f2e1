//! Run reports returned by the engines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Outcome of one backup run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupReport {
    /// Database that was dumped
    pub database: String,

    /// Collection jobs dispatched
    pub collections: usize,

    /// Collection jobs that ended with an error
    pub collections_failed: usize,

    /// Document files written
    pub documents_written: u64,

    /// Uncompressed dump tree, when one is left on disk
    #[serde(default)]
    pub tree: Option<PathBuf>,

    /// Archive file written under the root
    #[serde(default)]
    pub archive: Option<PathBuf>,

    /// Whether the archive went to a caller-supplied stream
    #[serde(default)]
    pub streamed: bool,

    /// Whether the run reached its last stage
    pub completed: bool,

    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl BackupReport {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for BackupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backup of {}: {} collections ({} failed), {} documents in {}ms",
            self.database,
            self.collections,
            self.collections_failed,
            self.documents_written,
            self.duration_ms
        )?;
        if let Some(archive) = &self.archive {
            write!(f, ", archive {}", archive.display())?;
        } else if self.streamed {
            write!(f, ", archive streamed")?;
        } else if let Some(tree) = &self.tree {
            write!(f, ", tree {}", tree.display())?;
        }
        if !self.completed {
            write!(f, " [incomplete]")?;
        }
        Ok(())
    }
}

/// Outcome of one restore run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Database restored into
    pub database: String,

    /// Collection directory read from the archive
    #[serde(default)]
    pub source_collection: Option<String>,

    /// Destination collection
    pub target_collection: String,

    /// Documents inserted into the destination
    pub documents_restored: u64,

    /// Index creations that succeeded
    pub indexes_created: usize,

    /// Index creations that failed
    pub indexes_failed: usize,

    /// Whether the run reached its last stage
    pub completed: bool,

    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl RestoreReport {
    pub fn new(database: impl Into<String>, target_collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            target_collection: target_collection.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "restore into {}.{}: {} documents, {} indexes ({} failed) in {}ms",
            self.database,
            self.target_collection,
            self.documents_restored,
            self.indexes_created,
            self.indexes_failed,
            self.duration_ms
        )?;
        if let Some(source) = &self.source_collection {
            write!(f, " from {}", source)?;
        }
        if !self.completed {
            write!(f, " [incomplete]")?;
        }
        Ok(())
    }
}

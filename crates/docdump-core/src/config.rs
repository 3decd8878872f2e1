//! Configuration structures for dump and restore runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::codec::CodecKind;

/// Archive name that asks the engine to generate one from the clock
pub const AUTO_ARCHIVE_NAME: &str = "auto";

/// Main configuration structure, as read from a run file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operation mode
    pub mode: Mode,

    /// Database connection
    pub database: DatabaseConfig,

    /// Backup-specific options
    #[serde(default)]
    pub backup: Option<BackupOptions>,

    /// Restore-specific options
    #[serde(default)]
    pub restore: Option<RestoreOptions>,
}

/// Operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Backup,
    Restore,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string, e.g. `mongodb://localhost:27017`
    pub uri: String,

    /// Database to dump or restore into
    pub name: String,
}

/// Backup options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOptions {
    /// Directory receiving the dump tree, or the archive when archiving
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Document file format
    #[serde(default)]
    pub codec: CodecKind,

    /// Collections to dump; absent means every collection
    #[serde(default)]
    pub collections: Option<Vec<String>>,

    /// Match filter used by the query strategy
    #[serde(default)]
    pub query: Option<Map<String, Value>>,

    /// Cursors per collection for a parallel scan (0 = single query)
    #[serde(default)]
    pub num_cursors: u32,

    /// Archive file name; `auto` names it `yyyyMMdd-hhmmss-<db>.tar.gz`
    #[serde(default)]
    pub archive: Option<String>,

    /// Capture index definitions alongside the documents
    #[serde(default)]
    pub metadata: bool,

    /// Where the uncompressed tree is built before archiving
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Maximum number of collections dumped at once (default: 8)
    #[serde(default = "default_max_concurrent_collections")]
    pub max_concurrent_collections: usize,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            root: None,
            codec: CodecKind::default(),
            collections: None,
            query: None,
            num_cursors: 0,
            archive: None,
            metadata: false,
            staging_dir: None,
            max_concurrent_collections: default_max_concurrent_collections(),
        }
    }
}

fn default_max_concurrent_collections() -> usize {
    8
}

/// Restore options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Directory holding the archive
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Archive file name inside `root`
    #[serde(default)]
    pub archive: Option<String>,

    /// Destination collection
    pub collection: String,

    /// Create `collection` from scratch instead of dropping and reusing it
    #[serde(default)]
    pub new_collection: bool,

    /// Document file format inside the archive
    #[serde(default)]
    pub codec: CodecKind,

    /// Replay index definitions after the documents
    #[serde(default)]
    pub metadata: bool,

    /// Parent of the private extraction directory (default: system temp dir)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.database.uri.trim().is_empty() {
            return Err(crate::Error::Config("database.uri is required".to_string()));
        }
        crate::layout::validate_component(&self.database.name)
            .map_err(|e| crate::Error::Config(format!("database.name: {}", e)))?;

        match self.mode {
            Mode::Backup => {
                let backup = self.backup.as_ref().ok_or_else(|| {
                    crate::Error::Config(
                        "Backup options are required for backup mode".to_string(),
                    )
                })?;
                backup.validate()?;
            }
            Mode::Restore => {
                let restore = self.restore.as_ref().ok_or_else(|| {
                    crate::Error::Config(
                        "Restore options are required for restore mode".to_string(),
                    )
                })?;
                restore.validate()?;
            }
        }

        Ok(())
    }

    /// Parse and validate a YAML run file
    pub fn from_yaml(text: &str) -> crate::Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

impl BackupOptions {
    /// Validate backup options
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_concurrent_collections == 0 {
            return Err(crate::Error::Config(
                "max_concurrent_collections must be > 0".to_string(),
            ));
        }

        if let Some(collections) = &self.collections {
            if collections.is_empty() {
                return Err(crate::Error::Config(
                    "collections must name at least one collection when present".to_string(),
                ));
            }
        }

        if let Some(archive) = &self.archive {
            if archive != AUTO_ARCHIVE_NAME {
                crate::layout::validate_component(archive)
                    .map_err(|e| crate::Error::Config(format!("archive: {}", e)))?;
            }
        }

        Ok(())
    }
}

impl RestoreOptions {
    /// Validate restore options
    pub fn validate(&self) -> crate::Result<()> {
        crate::layout::validate_component(&self.collection)
            .map_err(|e| crate::Error::Config(format!("collection: {}", e)))?;

        if let Some(archive) = &self.archive {
            crate::layout::validate_component(archive)
                .map_err(|e| crate::Error::Config(format!("archive: {}", e)))?;
        }

        Ok(())
    }
}

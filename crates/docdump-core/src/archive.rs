//! Archive packaging and extraction.
//!
//! A backup of one database can be folded into a single gzip-compressed
//! tape archive whose only top-level entry is the database directory.
//! Archive files are named `yyyyMMdd-hhmmss-<database>[-<collection>].tar.gz`.

use chrono::{Datelike, NaiveDateTime, Timelike};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tar::{Archive, Builder};
use tokio::fs;
use tracing::{debug, info};

use crate::{Error, Result};

/// Suffix shared by every archive file
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const STAMP_LEN: usize = 15;

/// An archive file name, with its creation time and database when the
/// name follows the naming convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    file_name: String,
    created: Option<NaiveDateTime>,
    database: Option<String>,
}

impl ArchiveName {
    /// Name a new archive for `database` (and optionally one collection).
    pub fn generate(now: NaiveDateTime, database: &str, collection: Option<&str>) -> Self {
        let label = match collection {
            Some(collection) => format!("{}-{}", database, collection),
            None => database.to_string(),
        };
        let file_name = format!("{}-{}{}", now.format(STAMP_FORMAT), label, ARCHIVE_SUFFIX);
        Self {
            file_name,
            created: now.with_nanosecond(0),
            database: Some(label),
        }
    }

    /// Parse an archive file name. Names that do not follow the convention
    /// are kept verbatim with no timestamp or database.
    pub fn parse(file_name: &str) -> Self {
        let verbatim = Self {
            file_name: file_name.to_string(),
            created: None,
            database: None,
        };

        let Some(stem) = file_name.strip_suffix(ARCHIVE_SUFFIX) else {
            return verbatim;
        };
        let (Some(stamp), Some("-"), Some(database)) = (
            stem.get(..STAMP_LEN),
            stem.get(STAMP_LEN..STAMP_LEN + 1),
            stem.get(STAMP_LEN + 1..),
        ) else {
            return verbatim;
        };
        if database.is_empty() {
            return verbatim;
        }
        match NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT) {
            Ok(created) => Self {
                file_name: file_name.to_string(),
                created: Some(created),
                database: Some(database.to_string()),
            },
            Err(_) => verbatim,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn created(&self) -> Option<NaiveDateTime> {
        self.created
    }

    /// Database label, including the collection suffix when there is one
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// `(year, month, day, hour, minute)` of a conventional name
    pub fn stamp(&self) -> Option<(i32, u32, u32, u32, u32)> {
        self.created
            .map(|t| (t.year(), t.month(), t.day(), t.hour(), t.minute()))
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.created, &self.database) {
            (Some(created), Some(database)) => {
                write!(f, "{} {}", created.format("%Y-%m-%d %H:%M"), database)
            }
            _ => f.write_str(&self.file_name),
        }
    }
}

/// Where a packed archive is written
pub enum ArchiveDestination {
    /// A file, written through a temporary sibling and renamed into place
    File(PathBuf),
    /// A caller-supplied sink
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for ArchiveDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveDestination::File(path) => f.debug_tuple("File").field(path).finish(),
            ArchiveDestination::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Where an archive is read from
pub enum ArchiveSource {
    File(PathBuf),
    Reader(Box<dyn Read + Send>),
}

impl fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ArchiveSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Compress `database_dir` into one archive whose top-level entry is the
/// directory's own name.
pub async fn pack(database_dir: &Path, destination: ArchiveDestination) -> Result<()> {
    let entry_name = database_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            Error::Archive(format!(
                "{} has no directory name to archive under",
                database_dir.display()
            ))
        })?;
    let source = database_dir.to_path_buf();

    info!("Packing {} into {:?}", source.display(), destination);
    tokio::task::spawn_blocking(move || match destination {
        ArchiveDestination::File(path) => pack_to_file(&source, &entry_name, &path),
        ArchiveDestination::Writer(writer) => pack_into(&source, &entry_name, writer),
    })
    .await
    .map_err(|e| Error::Archive(format!("Packing task failed: {}", e)))?
}

fn pack_to_file(source: &Path, entry_name: &str, path: &Path) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let file = File::create(&temp_path)
        .map_err(|e| Error::Archive(format!("Failed to create {}: {}", temp_path.display(), e)))?;

    match pack_into(source, entry_name, BufWriter::new(file)) {
        Ok(()) => {
            std::fs::rename(&temp_path, path).map_err(|e| {
                Error::Archive(format!("Failed to move archive to {}: {}", path.display(), e))
            })?;
            debug!("Wrote archive {}", path.display());
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&temp_path);
            Err(e)
        }
    }
}

fn pack_into<W: Write>(source: &Path, entry_name: &str, writer: W) -> Result<()> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = Builder::new(encoder);
    builder
        .append_dir_all(entry_name, source)
        .map_err(|e| Error::Archive(format!("Failed to add {}: {}", source.display(), e)))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::Archive(format!("Failed to finish tar stream: {}", e)))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| Error::Archive(format!("Failed to finish gzip stream: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Archive(format!("Failed to flush archive: {}", e)))
}

/// Extract an archive into `into`, which must already exist.
pub async fn unpack(source: ArchiveSource, into: &Path) -> Result<()> {
    let target = into.to_path_buf();
    info!("Extracting {:?} into {}", source, target.display());

    tokio::task::spawn_blocking(move || {
        let reader: Box<dyn Read + Send> = match source {
            ArchiveSource::File(path) => {
                let file = File::open(&path).map_err(|e| {
                    Error::Archive(format!("Failed to open {}: {}", path.display(), e))
                })?;
                Box::new(BufReader::new(file))
            }
            ArchiveSource::Reader(reader) => reader,
        };
        Archive::new(GzDecoder::new(reader))
            .unpack(&target)
            .map_err(|e| Error::Archive(format!("Failed to extract archive: {}", e)))
    })
    .await
    .map_err(|e| Error::Archive(format!("Extraction task failed: {}", e)))?
}

/// One archive found in a dump root
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: ArchiveName,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Archives directly under `root`, newest first. A missing root has none.
pub async fn list_archives(root: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut dir = match fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut archives = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !file_name.ends_with(ARCHIVE_SUFFIX) {
            continue;
        }
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::Io(e)),
        };
        archives.push(ArchiveEntry {
            name: ArchiveName::parse(&file_name),
            path: entry.path(),
            size: meta.len(),
            modified: meta.modified().ok(),
        });
    }

    archives.sort_by(|a, b| {
        b.name
            .created()
            .cmp(&a.name.created())
            .then_with(|| b.modified.cmp(&a.modified))
            .then_with(|| b.name.file_name().cmp(a.name.file_name()))
    });
    Ok(archives)
}

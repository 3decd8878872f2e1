//! Restore engine orchestration.

use bson::Document;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tokio::fs;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::archive::{self, ArchiveSource};
use crate::codec::{Codec, DocumentCodec};
use crate::error::CodecError;
use crate::layout::{collection_dirs, ensure_dir, first_directory, METADATA_DIR};
use crate::report::RestoreReport;
use crate::run::RestoreConfig;
use crate::selector::resolve_target;
use crate::{Error, Result};

const STAGING_PREFIX: &str = "docdump-restore-";

/// Restore engine for loading one archived collection
pub struct RestoreEngine {
    config: RestoreConfig,
}

impl RestoreEngine {
    /// Create a new restore engine
    pub fn new(config: RestoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RestoreConfig {
        &self.config
    }

    /// Run the restore.
    ///
    /// Errors past configuration are logged, never returned. The completion
    /// callback has fired and the extraction directory is gone by the time
    /// this returns.
    pub async fn run(&self) -> RestoreReport {
        let run = async {
            let span = info_span!(
                "restore",
                database = %self.config.database_name(),
                archive = self.config.archive.as_deref().unwrap_or("<stream>"),
                collection = %self.config.collection,
            );
            self.run_internal().instrument(span).await
        };

        match self.config.logger.clone() {
            Some(dispatch) => run.with_subscriber(dispatch).await,
            None => run.await,
        }
    }

    async fn run_internal(&self) -> RestoreReport {
        let started = Instant::now();
        let mut report =
            RestoreReport::new(self.config.database_name(), &self.config.collection);
        info!("Restore start");

        let staging = match self.staging_dir().await {
            Ok(staging) => Some(staging),
            Err(e) => {
                error!("Failed to create extraction directory: {}", e);
                None
            }
        };

        if let Some(staging) = &staging {
            match self.restore(staging.path(), &mut report).await {
                Ok(()) => report.completed = true,
                Err(e) => error!(
                    "Restore into {} failed: {}",
                    self.config.collection, e
                ),
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!("{}", report);

        if self.config.completion.fire() {
            debug!("Completion callback invoked");
        }

        if let Some(staging) = staging {
            let path = staging.path().to_path_buf();
            match staging.close() {
                Ok(()) => debug!("Removed extraction directory {}", path.display()),
                Err(e) => warn!(
                    "Failed to remove extraction directory {}: {}",
                    path.display(),
                    e
                ),
            }
        }
        report
    }

    async fn staging_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let staging = match &self.config.staging_dir {
            Some(parent) => {
                let parent = ensure_dir(parent).await?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(staging)
    }

    async fn restore(&self, staging: &Path, report: &mut RestoreReport) -> Result<()> {
        let db = self.config.db.as_ref();
        let target = self.config.collection.as_str();

        // extract-archive
        archive::unpack(self.archive_source()?, staging).await?;

        // locate-root
        let database_dir = first_directory(staging)
            .await?
            .ok_or_else(|| Error::Archive("archive holds no database directory".to_string()))?;
        let collections = collection_dirs(&database_dir).await?;
        let source = collections.first().cloned().ok_or_else(|| {
            Error::Archive(format!(
                "{} holds no collection directory",
                database_dir.display()
            ))
        })?;
        if collections.len() > 1 {
            warn!(
                "Archive holds {} collections, only {} is restored",
                collections.len(),
                source
            );
        }
        info!("Restoring {} into {}", source, target);
        report.source_collection = Some(source.clone());

        // resolve-target-collection
        resolve_target(db, target, self.config.target_mode).await?;

        // replay-documents
        let documents = read_documents(&database_dir.join(&source), &self.config.codec).await?;
        if documents.is_empty() {
            debug!("No documents to insert into {}", target);
        } else {
            report.documents_restored = db.insert_many(target, documents).await?;
            info!("Inserted {} documents into {}", report.documents_restored, target);
        }

        // metadata-replay
        let metadata_file = database_dir.join(METADATA_DIR).join(&source);
        let fan_in = self.config.metadata.replay(db, &metadata_file, target).await;
        report.indexes_created = fan_in.succeeded;
        report.indexes_failed = fan_in.failed;
        if let Some(e) = fan_in.last_error {
            warn!("{} index creations failed, last error: {}", fan_in.failed, e);
        }

        Ok(())
    }

    fn archive_source(&self) -> Result<ArchiveSource> {
        if let Some(reader) = self.config.source.lock().take() {
            info!("Reading archive from stream");
            return Ok(ArchiveSource::Reader(reader));
        }

        match (&self.config.root, &self.config.archive) {
            (Some(root), Some(archive)) => Ok(ArchiveSource::File(root.join(archive))),
            _ => Err(Error::Config(
                "missing root or archive option".to_string(),
            )),
        }
    }
}

/// Decode every file of one collection directory, one file at a time.
///
/// A non-regular entry or an undecodable file aborts the whole collection.
async fn read_documents(collection_dir: &Path, codec: &Codec) -> Result<Vec<Document>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut entries = fs::read_dir(collection_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::Io(e)),
        };
        if !meta.is_file() {
            return Err(CodecError::NotAFile(path.display().to_string()).into());
        }

        let bytes = fs::read(&path).await?;
        match codec.decode(&bytes) {
            Ok(document) => documents.push(document),
            Err(e) => {
                error!("Failed to decode {}: {}", path.display(), e);
                return Err(e);
            }
        }
    }
    Ok(documents)
}

//! Backup engine orchestration.

use bson::Document;
use chrono::Local;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tempfile::TempDir;
use tokio::fs;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::archive::{self, ArchiveDestination, ArchiveName, ARCHIVE_SUFFIX};
use crate::codec::{document_file_stem, Codec, DocumentCodec};
use crate::config::AUTO_ARCHIVE_NAME;
use crate::db::{DocumentDatabase, DocumentStream};
use crate::error::CodecError;
use crate::fan_out::FanOut;
use crate::layout::{ensure_dir, remove_tree, DumpTree};
use crate::metadata::MetadataPolicy;
use crate::report::BackupReport;
use crate::run::BackupConfig;
use crate::selector::{select_collections, CollectionFilter, Retrieval};
use crate::{Error, Result};

/// Backup engine for dumping one database
pub struct BackupEngine {
    config: BackupConfig,
}

impl BackupEngine {
    /// Create a new backup engine
    pub fn new(config: BackupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Run the backup.
    ///
    /// Errors past configuration are logged, never returned. The completion
    /// callback has fired by the time this returns.
    pub async fn run(&self) -> BackupReport {
        let run = async {
            let span = info_span!(
                "backup",
                database = %self.config.database_name(),
                archive = self.config.archive.as_deref().unwrap_or("-"),
            );
            self.run_internal().instrument(span).await
        };

        match self.config.logger.clone() {
            Some(dispatch) => run.with_subscriber(dispatch).await,
            None => run.await,
        }
    }

    async fn run_internal(&self) -> BackupReport {
        let started = Instant::now();
        let mut report = BackupReport::new(self.config.database_name());
        info!("Backup start");

        match self.dump(&mut report).await {
            Ok(()) => report.completed = true,
            Err(e) => error!("Backup of {} failed: {}", report.database, e),
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!("{}", report);

        if self.config.completion.fire() {
            debug!("Completion callback invoked");
        }
        report
    }

    async fn dump(&self, report: &mut BackupReport) -> Result<()> {
        let database = self.config.database_name();
        let archive_name = self.archive_name();

        // prepare-tree
        let staging = match &archive_name {
            Some(name) => Some(self.staging_tree(name).await?),
            None => None,
        };
        let tree_root = match &staging {
            Some(staging) => staging.path().to_path_buf(),
            None => {
                let root = self
                    .config
                    .root
                    .as_ref()
                    .ok_or_else(|| Error::Config("missing root option".to_string()))?;
                ensure_dir(root).await?
            }
        };
        let tree = DumpTree::new(&tree_root);
        let database_dir = ensure_dir(&tree.database_dir(database)).await?;
        report.tree = Some(tree_root.clone());

        // metadata-prepare
        if self.config.metadata.is_enabled() {
            ensure_dir(&tree.metadata_dir(database)).await?;
        }

        // dispatch
        let collections =
            select_collections(self.config.db.as_ref(), &self.config.collections).await?;
        if collections.is_empty() {
            warn!("No collections matched in {}", database);
        }
        info!(
            "Backing up {} collections (max {} concurrent)",
            collections.len(),
            self.config.max_concurrent_collections
        );

        let documents_written = AtomicU64::new(0);
        let jobs = collections.iter().map(|collection| {
            let ctx = BackupCollectionContext {
                collection,
                db: self.config.db.as_ref(),
                tree: &tree,
                codec: &self.config.codec,
                retrieval: &self.config.retrieval,
                metadata: self.config.metadata,
                documents_written: &documents_written,
                stems: Mutex::new(HashSet::new()),
            };
            (collection.clone(), ctx.backup_collection())
        });
        let fan_in = FanOut::new("collection")
            .limit(self.config.max_concurrent_collections)
            .run(jobs)
            .await;

        report.collections = fan_in.total;
        report.collections_failed = fan_in.failed;
        report.documents_written = documents_written.load(Ordering::Relaxed);
        if let Some(e) = &fan_in.last_error {
            warn!(
                "{} of {} collections failed, last error: {}",
                fan_in.failed, fan_in.total, e
            );
        }

        // archive
        let (Some(archive_name), Some(staging)) = (archive_name, staging) else {
            return Ok(());
        };
        let destination = self.archive_destination(&archive_name).await?;
        let archive_path = match &destination {
            ArchiveDestination::File(path) => Some(path.clone()),
            ArchiveDestination::Writer(_) => None,
        };
        if let Err(e) = archive::pack(&database_dir, destination).await {
            let kept = staging.keep();
            error!("Archiving failed, leaving dump tree at {}", kept.display());
            report.tree = Some(kept);
            return Err(e);
        }
        report.streamed = archive_path.is_none();
        report.archive = archive_path;

        // cleanup
        remove_tree(&tree_root).await?;
        if let Err(e) = staging.close() {
            warn!(
                "Failed to remove staging directory {}: {}",
                tree_root.display(),
                e
            );
        }
        report.tree = None;
        Ok(())
    }

    /// Resolve the configured archive name, generating one for `auto`
    fn archive_name(&self) -> Option<ArchiveName> {
        let name = self.config.archive.as_deref()?;
        if name != AUTO_ARCHIVE_NAME {
            return Some(ArchiveName::parse(name));
        }

        let collection = match &self.config.collections {
            CollectionFilter::Only(names) if names.len() == 1 => Some(names[0].as_str()),
            _ => None,
        };
        Some(ArchiveName::generate(
            Local::now().naive_local(),
            self.config.database_name(),
            collection,
        ))
    }

    /// Private directory the tree is built in before it is archived
    async fn staging_tree(&self, name: &ArchiveName) -> Result<TempDir> {
        let stem = name
            .file_name()
            .strip_suffix(ARCHIVE_SUFFIX)
            .unwrap_or(name.file_name());
        let prefix = format!("docdump-{}-", stem);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let staging = match &self.config.staging_dir {
            Some(parent) => {
                let parent = ensure_dir(parent).await?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        debug!("Staging dump tree at {}", staging.path().display());
        Ok(staging)
    }

    async fn archive_destination(&self, name: &ArchiveName) -> Result<ArchiveDestination> {
        if let Some(sink) = self.config.sink.lock().take() {
            info!("Sending archive to stream");
            return Ok(ArchiveDestination::Writer(sink));
        }

        let root = self
            .config
            .root
            .as_ref()
            .ok_or_else(|| Error::Config("missing root option".to_string()))?;
        let root = ensure_dir(root).await?;
        let path = root.join(name.file_name());
        info!("Making archive at {}", path.display());
        Ok(ArchiveDestination::File(path))
    }
}

/// Context for dumping a single collection
struct BackupCollectionContext<'a> {
    collection: &'a str,
    db: &'a dyn DocumentDatabase,
    tree: &'a DumpTree,
    codec: &'a Codec,
    retrieval: &'a Retrieval,
    metadata: MetadataPolicy,
    documents_written: &'a AtomicU64,
    stems: Mutex<HashSet<String>>,
}

impl BackupCollectionContext<'_> {
    async fn backup_collection(self) -> Result<()> {
        debug!("Starting backup of collection {}", self.collection);
        ensure_dir(&self.tree.collection_dir(self.db.name(), self.collection)).await?;

        self.metadata
            .capture(self.db, self.tree, self.collection)
            .await?;

        match self.retrieval {
            Retrieval::Query(filter) => {
                let documents = self.db.find(self.collection, filter.clone()).await?;
                debug!(
                    "{}: query returned {} documents",
                    self.collection,
                    documents.len()
                );
                self.write_documents(documents).await?;
            }
            Retrieval::ParallelScan(num_cursors) => {
                let cursors = self.db.parallel_scan(self.collection, *num_cursors).await?;
                debug!(
                    "{}: draining {} cursors",
                    self.collection,
                    cursors.len()
                );
                let drains = cursors.into_iter().enumerate().map(|(i, cursor)| {
                    (
                        format!("{}#{}", self.collection, i),
                        self.drain_cursor(cursor),
                    )
                });
                FanOut::new("cursor").run(drains).await.into_result()?;
            }
        }

        debug!("Completed backup of collection {}", self.collection);
        Ok(())
    }

    async fn drain_cursor(&self, mut cursor: DocumentStream) -> Result<()> {
        let mut documents = Vec::new();
        while let Some(document) = cursor.next().await {
            documents.push(document?);
        }
        self.write_documents(documents).await
    }

    /// Write documents one file at a time
    async fn write_documents(&self, documents: Vec<Document>) -> Result<()> {
        let writes = documents.into_iter().map(|document| {
            let key = document
                .get("_id")
                .map(|id| id.to_string())
                .unwrap_or_else(|| "<no _id>".to_string());
            (key, self.write_document(document))
        });
        FanOut::new("document write")
            .limit(1)
            .run(writes)
            .await
            .into_result()
    }

    async fn write_document(&self, document: Document) -> Result<()> {
        let stem = document_file_stem(&document)?;
        if !self.stems.lock().insert(stem.clone()) {
            return Err(CodecError::DocumentId(format!(
                "duplicate file stem {} in {}",
                stem, self.collection
            ))
            .into());
        }
        let bytes = self.codec.encode(&document)?;
        let path = self.tree.document_path(
            self.db.name(),
            self.collection,
            &stem,
            self.codec.extension(),
        );
        fs::write(&path, bytes).await?;
        self.documents_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

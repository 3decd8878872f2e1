//! Run configuration snapshots.
//!
//! A [`BackupConfig`] or [`RestoreConfig`] is assembled once through its
//! builder, validated before anything touches the filesystem, and then only
//! read by the engine for the rest of the run.

use bson::{Bson, Document};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Dispatch;

use crate::codec::{Codec, DocumentCodec};
use crate::config::{BackupOptions, RestoreOptions, AUTO_ARCHIVE_NAME};
use crate::db::DocumentDatabase;
use crate::layout::validate_component;
use crate::metadata::MetadataPolicy;
use crate::selector::{CollectionFilter, Retrieval, TargetMode};
use crate::{Error, Result};

/// Callback invoked when a run reaches a terminal state
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Holds a completion callback and invokes it at most once.
pub struct CompletionSignal {
    callback: Mutex<Option<CompletionCallback>>,
}

impl CompletionSignal {
    pub fn new(callback: Option<CompletionCallback>) -> Self {
        Self {
            callback: Mutex::new(callback),
        }
    }

    /// Invoke the callback if it has not run yet. Returns whether it ran.
    pub fn fire(&self) -> bool {
        let callback = self.callback.lock().take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("pending", &self.callback.lock().is_some())
            .finish()
    }
}

/// Parse a query written as extended JSON, so `$oid` and `$date` values
/// match the native types stored in the database.
fn query_filter(map: Map<String, Value>) -> Result<Document> {
    match Bson::try_from(Value::Object(map)) {
        Ok(Bson::Document(filter)) => Ok(filter),
        Ok(other) => Err(Error::Config(format!(
            "query must be a document, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(Error::Config(format!("query: {}", e))),
    }
}

fn root_must_not_be_a_file(root: &Path) -> Result<()> {
    if root.as_os_str().is_empty() {
        return Err(Error::Config("root option is empty".to_string()));
    }
    if root.exists() && !root.is_dir() {
        return Err(Error::Config(format!(
            "root option {} is not a directory",
            root.display()
        )));
    }
    Ok(())
}

/// Everything one backup run needs
pub struct BackupConfig {
    pub(crate) db: Arc<dyn DocumentDatabase>,
    pub(crate) root: Option<PathBuf>,
    pub(crate) staging_dir: Option<PathBuf>,
    pub(crate) codec: Codec,
    pub(crate) collections: CollectionFilter,
    pub(crate) retrieval: Retrieval,
    pub(crate) archive: Option<String>,
    pub(crate) metadata: MetadataPolicy,
    pub(crate) max_concurrent_collections: usize,
    pub(crate) sink: Mutex<Option<Box<dyn Write + Send>>>,
    pub(crate) logger: Option<Dispatch>,
    pub(crate) completion: CompletionSignal,
}

impl BackupConfig {
    pub fn builder() -> BackupConfigBuilder {
        BackupConfigBuilder::default()
    }

    pub fn database_name(&self) -> &str {
        self.db.name()
    }

    /// Whether the tree is folded into an archive at the end of the run
    pub fn is_archiving(&self) -> bool {
        self.archive.is_some() || self.sink.lock().is_some()
    }
}

impl fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupConfig")
            .field("database", &self.db.name())
            .field("root", &self.root)
            .field("staging_dir", &self.staging_dir)
            .field("codec", &self.codec)
            .field("collections", &self.collections)
            .field("retrieval", &self.retrieval)
            .field("archive", &self.archive)
            .field("metadata", &self.metadata)
            .field("stream", &self.sink.lock().is_some())
            .finish()
    }
}

/// Builder for [`BackupConfig`]
#[derive(Default)]
pub struct BackupConfigBuilder {
    db: Option<Arc<dyn DocumentDatabase>>,
    options: BackupOptions,
    query: Option<Document>,
    sink: Option<Box<dyn Write + Send>>,
    codec: Option<Arc<dyn DocumentCodec>>,
    logger: Option<Dispatch>,
    callback: Option<CompletionCallback>,
}

impl BackupConfigBuilder {
    pub fn database(mut self, db: Arc<dyn DocumentDatabase>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn options(mut self, options: BackupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.root = Some(root.into());
        self
    }

    /// Match filter for the query strategy, taking precedence over `options.query`
    pub fn query(mut self, filter: Document) -> Self {
        self.query = Some(filter);
        self
    }

    /// Write the archive into `sink` instead of a file under the root
    pub fn stream(mut self, sink: impl Write + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Use a caller-provided codec instead of `options.codec`
    pub fn codec(mut self, codec: Arc<dyn DocumentCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Route the run's log events to `dispatch` instead of the default subscriber
    pub fn logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Result<BackupConfig> {
        let db = self
            .db
            .ok_or_else(|| Error::Config("missing database handle".to_string()))?;
        validate_component(db.name())
            .map_err(|e| Error::Config(format!("database name: {}", e)))?;

        let options = self.options;
        options.validate()?;

        match (&options.root, &self.sink) {
            (Some(root), _) => root_must_not_be_a_file(root)?,
            (None, Some(_)) => {}
            (None, None) => return Err(Error::Config("missing root option".to_string())),
        }

        let codec = match self.codec {
            Some(custom) => Codec::Custom(custom),
            None => Codec::from_kind(options.codec),
        };

        let query = match self.query {
            Some(filter) => Some(filter),
            None => options.query.map(query_filter).transpose()?,
        };
        let archive = match (options.archive, &self.sink) {
            (None, Some(_)) => Some(AUTO_ARCHIVE_NAME.to_string()),
            (archive, _) => archive,
        };

        Ok(BackupConfig {
            db,
            root: options.root,
            staging_dir: options.staging_dir,
            codec,
            collections: CollectionFilter::from(options.collections),
            retrieval: Retrieval::from_options(options.num_cursors, query),
            archive,
            metadata: MetadataPolicy::new(options.metadata),
            max_concurrent_collections: options.max_concurrent_collections,
            sink: Mutex::new(self.sink),
            logger: self.logger,
            completion: CompletionSignal::new(self.callback),
        })
    }
}

/// Everything one restore run needs
pub struct RestoreConfig {
    pub(crate) db: Arc<dyn DocumentDatabase>,
    pub(crate) root: Option<PathBuf>,
    pub(crate) archive: Option<String>,
    pub(crate) source: Mutex<Option<Box<dyn Read + Send>>>,
    pub(crate) collection: String,
    pub(crate) target_mode: TargetMode,
    pub(crate) codec: Codec,
    pub(crate) metadata: MetadataPolicy,
    pub(crate) staging_dir: Option<PathBuf>,
    pub(crate) logger: Option<Dispatch>,
    pub(crate) completion: CompletionSignal,
}

impl RestoreConfig {
    pub fn builder() -> RestoreConfigBuilder {
        RestoreConfigBuilder::default()
    }

    pub fn database_name(&self) -> &str {
        self.db.name()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn target_mode(&self) -> TargetMode {
        self.target_mode
    }
}

impl fmt::Debug for RestoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreConfig")
            .field("database", &self.db.name())
            .field("root", &self.root)
            .field("archive", &self.archive)
            .field("collection", &self.collection)
            .field("target_mode", &self.target_mode)
            .field("codec", &self.codec)
            .field("metadata", &self.metadata)
            .field("stream", &self.source.lock().is_some())
            .finish()
    }
}

/// Builder for [`RestoreConfig`]
#[derive(Default)]
pub struct RestoreConfigBuilder {
    db: Option<Arc<dyn DocumentDatabase>>,
    options: RestoreOptions,
    source: Option<Box<dyn Read + Send>>,
    codec: Option<Arc<dyn DocumentCodec>>,
    logger: Option<Dispatch>,
    callback: Option<CompletionCallback>,
}

impl RestoreConfigBuilder {
    pub fn database(mut self, db: Arc<dyn DocumentDatabase>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn options(mut self, options: RestoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Read the archive from `source` instead of `<root>/<archive>`
    pub fn stream(mut self, source: impl Read + Send + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn codec(mut self, codec: Arc<dyn DocumentCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Result<RestoreConfig> {
        let db = self
            .db
            .ok_or_else(|| Error::Config("missing database handle".to_string()))?;

        let options = self.options;
        options.validate()?;

        if self.source.is_none() {
            let root = options
                .root
                .as_ref()
                .ok_or_else(|| Error::Config("missing root option".to_string()))?;
            if !root.is_dir() {
                return Err(Error::Config(format!(
                    "root option {} is not a readable directory",
                    root.display()
                )));
            }
            if options.archive.is_none() {
                return Err(Error::Config("missing archive option".to_string()));
            }
        }

        let codec = match self.codec {
            Some(custom) => Codec::Custom(custom),
            None => Codec::from_kind(options.codec),
        };

        Ok(RestoreConfig {
            db,
            root: options.root,
            archive: options.archive,
            source: Mutex::new(self.source),
            collection: options.collection,
            target_mode: TargetMode::from_new_collection(options.new_collection),
            codec,
            metadata: MetadataPolicy::new(options.metadata),
            staging_dir: options.staging_dir,
            logger: self.logger,
            completion: CompletionSignal::new(self.callback),
        })
    }
}

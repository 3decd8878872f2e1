//! Docdump Core Library
//!
//! This crate provides the engine for dumping the collections of a document
//! database into a directory tree or a compressed archive, and for loading
//! an archived collection back.

pub mod archive;
pub mod backup;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod fan_out;
pub mod layout;
pub mod metadata;
pub mod report;
pub mod restore;
pub mod run;
pub mod selector;

pub use archive::{list_archives, ArchiveEntry, ArchiveName};
pub use backup::BackupEngine;
pub use codec::{BsonCodec, Codec, CodecKind, DocumentCodec, JsonCodec};
pub use config::{BackupOptions, Config, DatabaseConfig, Mode, RestoreOptions};
pub use db::{DocumentDatabase, MemoryDatabase};
#[cfg(feature = "mongodb")]
pub use db::MongoDatabase;
pub use error::{CodecError, DatabaseError, Error, Result};
pub use fan_out::{FanIn, FanOut};
pub use layout::DumpTree;
pub use metadata::{IndexDescriptor, MetadataPolicy};
pub use report::{BackupReport, RestoreReport};
pub use restore::RestoreEngine;
pub use run::{BackupConfig, CompletionSignal, RestoreConfig};
pub use selector::{CollectionFilter, Retrieval, TargetMode};

//! Collection selection and retrieval strategy.

use bson::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::db::DocumentDatabase;
use crate::layout::validate_component;
use crate::{Error, Result};

/// Collections whose names start with this prefix belong to the server
pub const RESERVED_PREFIX: &str = "system.";

/// Upper bound on cursors per collection for a parallel scan
pub const MAX_CURSORS: u16 = 10_000;

/// Whether a collection is reserved and must never be dumped
pub fn is_reserved(collection: &str) -> bool {
    collection.starts_with(RESERVED_PREFIX)
}

/// Which collections take part in a backup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CollectionFilter {
    #[default]
    All,
    Only(Vec<String>),
}

impl From<Option<Vec<String>>> for CollectionFilter {
    fn from(names: Option<Vec<String>>) -> Self {
        match names {
            Some(names) => CollectionFilter::Only(names),
            None => CollectionFilter::All,
        }
    }
}

/// How the documents of one collection are read
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// One cursor over a match query, fully materialized before any I/O
    Query(Document),
    /// Independent cursors drained concurrently
    ParallelScan(u16),
}

impl Retrieval {
    /// `num_cursors == 0` selects the query strategy; anything else is
    /// clamped into `[1, MAX_CURSORS]`.
    pub fn from_options(num_cursors: u32, query: Option<Document>) -> Self {
        if num_cursors == 0 {
            Retrieval::Query(query.unwrap_or_default())
        } else {
            let clamped = num_cursors.min(u32::from(MAX_CURSORS)) as u16;
            Retrieval::ParallelScan(clamped)
        }
    }
}

/// How the restore destination collection is obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMode {
    /// Drop the named collection, then recreate it empty
    #[default]
    DropAndReuse,
    /// Create the named collection; it must not exist yet
    CreateNew,
}

impl TargetMode {
    pub fn from_new_collection(new_collection: bool) -> Self {
        if new_collection {
            TargetMode::CreateNew
        } else {
            TargetMode::DropAndReuse
        }
    }
}

/// Resolve the collections to back up, reserved ones excluded, sorted.
pub async fn select_collections(
    db: &dyn DocumentDatabase,
    filter: &CollectionFilter,
) -> Result<Vec<String>> {
    let candidates: BTreeSet<String> = match filter {
        CollectionFilter::All => db.list_collections().await?.into_iter().collect(),
        CollectionFilter::Only(names) => names.iter().cloned().collect(),
    };

    let mut selected = Vec::with_capacity(candidates.len());
    for name in candidates {
        if is_reserved(&name) {
            debug!("Skipping reserved collection {}", name);
            continue;
        }
        if let Err(e) = validate_component(&name) {
            warn!("Skipping collection {}: {}", name, e);
            continue;
        }
        if matches!(filter, CollectionFilter::Only(_)) && !db.collection_exists(&name).await? {
            warn!("Requested collection {} does not exist", name);
            continue;
        }
        selected.push(name);
    }

    Ok(selected)
}

/// Prepare the restore destination according to `mode`.
pub async fn resolve_target(
    db: &dyn DocumentDatabase,
    collection: &str,
    mode: TargetMode,
) -> Result<()> {
    match mode {
        TargetMode::DropAndReuse => {
            info!("Dropping collection {}", collection);
            db.drop_collection(collection).await?;
            db.create_collection(collection).await?;
        }
        TargetMode::CreateNew => {
            if db.collection_exists(collection).await? {
                return Err(Error::CollectionExists(collection.to_string()));
            }
            info!("Creating collection {}", collection);
            db.create_collection(collection).await?;
        }
    }
    Ok(())
}

//! Fan-out/fan-in over independent sub-operations.
//!
//! Used at every granularity of a run: collections within a database,
//! cursors within a collection, documents within a codec pass and index
//! creations within a metadata replay.
//!
//! Policy: every sub-operation runs to completion. A failure is logged and
//! remembered, never short-circuits its siblings, and the continuation sees
//! only the last failure. Zero sub-operations is an immediate success.

use futures::stream::{self, StreamExt};
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

use crate::{Error, Result};

/// What a fan-in observed once every sub-operation reported
#[derive(Debug, Default)]
pub struct FanIn {
    /// Sub-operations dispatched
    pub total: usize,
    /// Sub-operations that returned `Ok`
    pub succeeded: usize,
    /// Sub-operations that returned `Err`
    pub failed: usize,
    /// Error of the failure that completed last
    pub last_error: Option<Error>,
}

impl FanIn {
    pub fn is_success(&self) -> bool {
        self.last_error.is_none()
    }

    /// Collapse into a `Result` carrying the last error
    pub fn into_result(self) -> Result<()> {
        match self.last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Dispatcher for one batch of sub-operations
#[derive(Debug, Clone)]
pub struct FanOut {
    label: String,
    limit: Option<usize>,
}

impl FanOut {
    /// Create a dispatcher; `label` names the kind of sub-operation in logs
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            limit: None,
        }
    }

    /// Bound the number of sub-operations in flight at once
    pub fn limit(mut self, max_in_flight: usize) -> Self {
        self.limit = Some(max_in_flight.max(1));
        self
    }

    /// Drive every `(key, operation)` pair to completion.
    ///
    /// Completions are counted in the order they arrive, which is not the
    /// order of dispatch.
    pub async fn run<K, I, Fut>(&self, operations: I) -> FanIn
    where
        K: Display,
        I: IntoIterator<Item = (K, Fut)>,
        Fut: Future<Output = Result<()>>,
    {
        let operations: Vec<(K, Fut)> = operations.into_iter().collect();
        let total = operations.len();
        if total == 0 {
            debug!("No {} to process", self.label);
            return FanIn::default();
        }

        let window = self.limit.unwrap_or(total).min(total);
        let mut completions = stream::iter(
            operations
                .into_iter()
                .map(|(key, op)| async move { (key, op.await) }),
        )
        .buffer_unordered(window);

        let mut fan_in = FanIn {
            total,
            ..FanIn::default()
        };
        while let Some((key, result)) = completions.next().await {
            match result {
                Ok(()) => fan_in.succeeded += 1,
                Err(e) => {
                    warn!("{} {} failed: {}", self.label, key, e);
                    fan_in.failed += 1;
                    fan_in.last_error = Some(e);
                }
            }
        }

        debug!(
            "Finished {} {} ({} failed)",
            fan_in.total, self.label, fan_in.failed
        );
        fan_in
    }

    /// Drive every operation, then hand the fan-in to `continuation`.
    ///
    /// The continuation runs exactly once, after the last completion.
    pub async fn run_then<K, I, Fut, C, R>(&self, operations: I, continuation: C) -> R
    where
        K: Display,
        I: IntoIterator<Item = (K, Fut)>,
        Fut: Future<Output = Result<()>>,
        C: FnOnce(FanIn) -> R,
    {
        let fan_in = self.run(operations).await;
        continuation(fan_in)
    }
}

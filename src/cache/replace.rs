//! Atomic hash rebuilds.
//!
//! A new mapping is written under a private staging key and published with a
//! single `RENAME` over the destination. `RENAME` replaces the destination in
//! one store-side step, so readers see either the whole previous mapping or
//! the whole new one.
//!
//! ```text
//!   HSET    dest:tmp:<uuid> f1 v1 f2 v2 ...     (or the sentinel when empty)
//!   PEXPIRE dest:tmp:<uuid> <ttl>
//!   RENAME  dest:tmp:<uuid> dest
//!   PEXPIRE dest <ttl>
//!   HDEL    dest ___                            (only when the sentinel was used)
//! ```
//!
//! The commands travel as one pipeline to save round trips. The pipeline is
//! not a transaction and nothing is rolled back on failure; atomicity of the
//! publish rests on `RENAME` alone. The staging key carries the ttl before it
//! is renamed, so a batch cut short after `HSET` leaves nothing that outlives
//! a normal entry.
//!
//! Two concurrent rebuilds of the same destination stage into different keys
//! and race only on `RENAME`: the last one to land wins, and neither caller
//! can tell which that was.

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::codec;
use super::keyspace::Keyspace;
use super::options::Operation;
use super::Cache;
use crate::domain::ports::Pipeline;
use crate::error::Result;

/// Placeholder field (and value) staged for an empty mapping so that the
/// staging key exists for `RENAME`.
pub const SENTINEL_FIELD: &str = "___";

/// A field left out of a rebuild because its value could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedField {
    pub field: String,
    pub reason: String,
}

/// Result of a successful rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Field/value pairs written to the published mapping
    pub staged: usize,
    /// Fields omitted because their value failed to encode
    pub skipped: Vec<SkippedField>,
}

impl ReplaceOutcome {
    /// True when every input field was published
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl Cache {
    /// Atomically replace the hash at `destination` with `fields`.
    ///
    /// An empty `fields` leaves the destination with no fields.
    #[instrument(skip(self, fields), fields(key = %destination))]
    pub async fn atomic_replace_hash<I, K, V>(
        &self,
        destination: &str,
        fields: I,
    ) -> Result<ReplaceOutcome>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let staged: Vec<(String, Bytes)> = fields
            .into_iter()
            .map(|(field, value)| (field.into(), value.into()))
            .collect();

        let staged = self.publish(destination, staged).await?;
        Ok(ReplaceOutcome {
            staged,
            skipped: Vec::new(),
        })
    }

    /// Atomically replace the hash at `destination` with JSON-encoded values.
    ///
    /// Encoding is best-effort per field: a value that fails to encode is
    /// left out of the published mapping, logged, and listed in
    /// [`ReplaceOutcome::skipped`]. It never aborts the rebuild.
    #[instrument(skip(self, fields), fields(key = %destination))]
    pub async fn atomic_replace_hash_encoded<I, K, T>(
        &self,
        destination: &str,
        fields: I,
    ) -> Result<ReplaceOutcome>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        let mut staged = Vec::new();
        let mut skipped = Vec::new();
        for (field, value) in fields {
            let field = field.into();
            match codec::encode(&value) {
                Ok(bytes) => staged.push((field, bytes)),
                Err(e) => {
                    warn!(field = %field, error = %e, "Omitting field that failed to encode");
                    skipped.push(SkippedField {
                        field,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if !skipped.is_empty() {
            self.stats.record_skipped_fields(skipped.len());
        }

        let staged = self.publish(destination, staged).await?;
        Ok(ReplaceOutcome { staged, skipped })
    }

    /// Stage `fields` under a fresh key and rename it over `destination`.
    ///
    /// Returns the number of distinct fields published; a repeated field
    /// keeps its last value.
    async fn publish(&self, destination: &str, fields: Vec<(String, Bytes)>) -> Result<usize> {
        let staging = Keyspace::staging_key(destination);
        let count = fields
            .iter()
            .map(|(field, _)| field.as_str())
            .collect::<HashSet<_>>()
            .len();
        let pipe = rebuild_pipeline(&staging, destination, fields, self.options.ttl);

        debug!(staging = %staging, fields = count, "Publishing hash rebuild");
        self.bounded(Operation::Pipeline, self.store.execute(pipe))
            .await?;
        self.stats.record_rebuild();

        Ok(count)
    }
}

/// Commands that stage `fields` under `staging` and publish them at `destination`.
fn rebuild_pipeline(
    staging: &str,
    destination: &str,
    fields: Vec<(String, Bytes)>,
    ttl: Duration,
) -> Pipeline {
    let use_sentinel = fields.is_empty();
    let staged = if use_sentinel {
        vec![(
            SENTINEL_FIELD.to_string(),
            Bytes::from_static(SENTINEL_FIELD.as_bytes()),
        )]
    } else {
        fields
    };

    let mut pipe = Pipeline::new();
    pipe.hset(staging, staged)
        .pexpire(staging, ttl)
        .rename(staging, destination)
        .pexpire(destination, ttl);
    if use_sentinel {
        pipe.hdel(destination, vec![SENTINEL_FIELD.to_string()]);
    }
    pipe
}

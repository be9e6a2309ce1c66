//! Cache Layer
//!
//! Typed snapshot/field accessors and atomic hash rebuilds over a
//! [`KvStore`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            Cache (handle)                            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  Keyspace            │ TimeoutBudget        │ CacheStats             │
//! │  prefix:part:part    │ read/write/pipeline  │ hits, misses, rebuilds │
//! ├──────────────────────┴──────────────────────┴────────────────────────┤
//! │  set_snapshot / try_get_snapshot     (scalar key, JSON value)        │
//! │  hget_encoded / hget_string          (one field of a hash)           │
//! │  atomic_replace_hash[_encoded]       (stage → RENAME → PEXPIRE)      │
//! └──────────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//!                         Arc<dyn KvStore> (port)
//! ```
//!
//! The handle is immutable after construction apart from its atomic
//! statistics, and is cheap to clone and share between tasks.

mod codec;
mod hash;
mod keyspace;
mod options;
mod replace;
mod snapshot;
mod stats;

use std::future::Future;
use std::sync::Arc;

pub use codec::{decode, encode};
pub use keyspace::{Keyspace, KEY_SEPARATOR, STAGING_TAG};
pub use options::{
    CacheOptions, Operation, TimeoutBudget, DEFAULT_KEY_PREFIX, DEFAULT_PIPELINE_TIMEOUT,
    DEFAULT_READ_TIMEOUT, DEFAULT_TTL, DEFAULT_WRITE_TIMEOUT,
};
pub use replace::{ReplaceOutcome, SkippedField, SENTINEL_FIELD};
pub use stats::{CacheStats, Lookup, StatsSnapshot};

use crate::adapters::MemoryStore;
use crate::domain::ports::{KeyTtl, KvStore};
use crate::error::Result;

/// Shared cache handle
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KvStore>,
    options: Arc<CacheOptions>,
    keyspace: Keyspace,
    budget: TimeoutBudget,
    stats: Arc<CacheStats>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Create a cache over `store`, filling unset options with defaults
    pub fn new(store: Arc<dyn KvStore>, options: CacheOptions) -> Self {
        let options = options.with_defaults();
        Self {
            store,
            keyspace: Keyspace::new(options.key_prefix.clone()),
            budget: options.budget(),
            options: Arc::new(options),
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Create a cache over a fresh [`MemoryStore`]
    pub fn in_memory(options: CacheOptions) -> Self {
        Self::new(Arc::new(MemoryStore::new()), options)
    }

    /// Build a namespaced key: `prefix:part:part...`
    pub fn key<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keyspace.key(parts)
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn budget(&self) -> TimeoutBudget {
        self.budget
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Remaining lifetime of `key`, within the read budget
    pub async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl> {
        self.bounded(Operation::Read, self.store.ttl(key)).await
    }

    /// Run a store call under the ceiling for `op`.
    async fn bounded<T>(&self, op: Operation, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let result = self.budget.run(op, fut).await;
        if matches!(&result, Err(e) if e.is_timeout()) {
            self.stats.record_timeout();
        }
        result
    }
}

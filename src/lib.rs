//! swapcache - Atomic hash rebuilds and typed accessors over a key-value store
//!
//! Publishes whole replacement mappings under a single key so that readers
//! never observe a half-written hash, and reads scalar snapshots and single
//! hash fields back as typed values.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Cache                                  │
//! │   keys · snapshots · hash fields · atomic rebuilds · budgets     │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │ KvStore (port)
//!                 ┌───────────────┴───────────────┐
//!                 ▼                               ▼
//!          MemoryStore                       RedisStore
//!        (in-process)                   (redis crate, multiplexed)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Store adapters implementing the domain port
//! - [`cache`] - Cache handle, keyspace, options and accessors
//! - [`domain`] - Store port, commands and replies
//! - [`error`] - Error types
//! - [`text`] - Text normalization

pub mod adapters;
pub mod cache;
pub mod domain;
pub mod error;
pub mod text;

// Re-export commonly used types
pub use adapters::{MemoryStore, RedisStore, RedisStoreConfig};
pub use cache::{Cache, CacheOptions, ReplaceOutcome, SkippedField};
pub use domain::{KeyTtl, KvStore};
pub use error::{Error, ErrorKind, Result};
pub use text::normalize;

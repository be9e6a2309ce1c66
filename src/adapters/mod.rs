//! Infrastructure Adapters
//!
//! Implementations of the [`KvStore`](crate::domain::KvStore) port.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Port: KvStore (trait)                         │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────┐  ┌────────────────────────────┐ │
//! │  │ MemoryStore                │  │ RedisStore                 │ │
//! │  │ in-process, Redis semantics│  │ redis crate, multiplexed   │ │
//! │  └────────────────────────────┘  └────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use swapcache::adapters::{RedisStore, RedisStoreConfig};
//! use swapcache::{Cache, CacheOptions};
//!
//! let store = RedisStore::connect(RedisStoreConfig::new("127.0.0.1:6379")).await?;
//! let cache = Cache::new(Arc::new(store), CacheOptions::default());
//! ```

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};

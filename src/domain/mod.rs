//! Domain Layer
//!
//! The store abstraction the cache layer is written against.
//!
//! - **Ports** (`ports.rs`) - the [`KvStore`] trait and the command, pipeline
//!   and reply value types that cross it
//!
//! # Usage
//!
//! ```ignore
//! use swapcache::domain::{KvStore, Pipeline};
//!
//! async fn publish<S: KvStore>(store: &S, tmp: &str, dest: &str) -> Result<()> {
//!     let mut pipe = Pipeline::new();
//!     pipe.rename(tmp, dest);
//!     store.execute(pipe).await?;
//!     Ok(())
//! }
//! ```

pub mod ports;

pub use ports::{Command, KeyTtl, KvStore, Pipeline, Reply};

//! Domain Ports (Port/Adapter Pattern)
//!
//! The cache layer depends only on the [`KvStore`] trait defined here.
//! Infrastructure adapters implement it to provide concrete stores.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Cache Layer                           │
//! │   keyspace │ timeout budget │ atomic replace │ accessors     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Port: KvStore (trait)                    │
//! │  get │ set │ hget │ hgetall │ ttl │ keys │ del │ execute      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Adapters (Impls)                           │
//! │          MemoryStore          │          RedisStore          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// =============================================================================
// Commands
// =============================================================================

/// A single store command that can be submitted as part of a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// SET key value [PX ttl]
    Set {
        key: String,
        value: Bytes,
        ttl: Option<Duration>,
    },
    /// HSET key field value [field value ...]
    HSet {
        key: String,
        fields: Vec<(String, Bytes)>,
    },
    /// HDEL key field [field ...]
    HDel { key: String, fields: Vec<String> },
    /// RENAME from to
    Rename { from: String, to: String },
    /// PEXPIRE key ttl
    PExpire { key: String, ttl: Duration },
    /// DEL key [key ...]
    Del { keys: Vec<String> },
}

impl Command {
    /// Command name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "SET",
            Command::HSet { .. } => "HSET",
            Command::HDel { .. } => "HDEL",
            Command::Rename { .. } => "RENAME",
            Command::PExpire { .. } => "PEXPIRE",
            Command::Del { .. } => "DEL",
        }
    }

    /// Encode the command as an argument vector (name first).
    pub fn to_args(&self) -> Vec<Bytes> {
        let mut args = vec![Bytes::from_static(self.name().as_bytes())];
        match self {
            Command::Set { key, value, ttl } => {
                args.push(Bytes::copy_from_slice(key.as_bytes()));
                args.push(value.clone());
                if let Some(ttl) = ttl {
                    args.push(Bytes::from_static(b"PX"));
                    args.push(Bytes::from(millis(*ttl).to_string()));
                }
            }
            Command::HSet { key, fields } => {
                args.push(Bytes::copy_from_slice(key.as_bytes()));
                for (field, value) in fields {
                    args.push(Bytes::copy_from_slice(field.as_bytes()));
                    args.push(value.clone());
                }
            }
            Command::HDel { key, fields } => {
                args.push(Bytes::copy_from_slice(key.as_bytes()));
                args.extend(fields.iter().map(|f| Bytes::copy_from_slice(f.as_bytes())));
            }
            Command::Rename { from, to } => {
                args.push(Bytes::copy_from_slice(from.as_bytes()));
                args.push(Bytes::copy_from_slice(to.as_bytes()));
            }
            Command::PExpire { key, ttl } => {
                args.push(Bytes::copy_from_slice(key.as_bytes()));
                args.push(Bytes::from(millis(*ttl).to_string()));
            }
            Command::Del { keys } => {
                args.extend(keys.iter().map(|k| Bytes::copy_from_slice(k.as_bytes())));
            }
        }
        args
    }
}

/// Millisecond expiry argument; the store rejects zero.
pub(crate) fn millis(ttl: Duration) -> u128 {
    ttl.as_millis().max(1)
}

// =============================================================================
// Pipeline
// =============================================================================

/// An ordered batch of commands submitted in one round trip.
///
/// A pipeline is NOT a transaction: commands from other clients may
/// interleave with it, and a failing command does not roll back the ones
/// before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn hset(&mut self, key: impl Into<String>, fields: Vec<(String, Bytes)>) -> &mut Self {
        self.push(Command::HSet {
            key: key.into(),
            fields,
        })
    }

    pub fn hdel(&mut self, key: impl Into<String>, fields: Vec<String>) -> &mut Self {
        self.push(Command::HDel {
            key: key.into(),
            fields,
        })
    }

    pub fn rename(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.push(Command::Rename {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn pexpire(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        self.push(Command::PExpire {
            key: key.into(),
            ttl,
        })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

// =============================================================================
// Replies
// =============================================================================

/// Reply to a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status reply such as `OK`
    Status(String),
    /// Integer reply
    Integer(i64),
    /// Binary-safe payload
    Data(Bytes),
    /// Nested replies
    Array(Vec<Reply>),
    /// Not-found
    Nil,
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist
    Missing,
    /// The key exists without an expiry
    Persistent,
    /// The key expires after the given duration
    Expires(Duration),
}

impl KeyTtl {
    /// Decode a PTTL-style reply (-2 missing, -1 persistent, otherwise ms).
    pub fn from_pttl(ms: i64) -> Self {
        match ms {
            -2 => KeyTtl::Missing,
            n if n < 0 => KeyTtl::Persistent,
            n => KeyTtl::Expires(Duration::from_millis(n as u64)),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            KeyTtl::Expires(d) => Some(*d),
            _ => None,
        }
    }
}

// =============================================================================
// Store Port
// =============================================================================

/// Port for a remote key-value store.
///
/// Absence is always reported as `Ok(None)` (or an empty collection), never
/// as an error. Implementations must be safe for concurrent use.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// GET key
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// SET key value PX ttl
    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// HGET key field
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>>;

    /// HGETALL key
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>>;

    /// PTTL key
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// KEYS pattern (glob-style)
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// DEL key [key ...], returning how many keys were removed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// PING
    async fn ping(&self) -> Result<()>;

    /// Submit a batch of commands in one round trip.
    ///
    /// Every command is attempted; on success one reply per command is
    /// returned in order. If any command failed, the first failure is
    /// returned and the effects of the other commands remain.
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>>;
}

// =============================================================================
// Tests
// =============================================================================

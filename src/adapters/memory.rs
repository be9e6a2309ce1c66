//! In-Memory Store Adapter
//!
//! Implements the `KvStore` port inside the process, following the store's
//! semantics closely enough for the cache layer's guarantees to be tested
//! against it:
//!
//! - keys expire lazily on access
//! - type mismatches fail with `WRONGTYPE`
//! - `RENAME` of a missing key fails, otherwise it replaces the destination
//!   in one step and carries the source expiry
//! - removing the last field of a hash removes the key
//! - each pipelined command takes the lock on its own, so a pipeline is not
//!   atomic

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::trace;

use crate::domain::ports::{Command, KeyTtl, KvStore, Pipeline, Reply};
use crate::error::{Error, Result};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    String(Bytes),
    Hash(HashMap<String, Bytes>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory key-value store
pub struct MemoryStore {
    data: RwLock<HashMap<String, Slot>>,
    /// Simulated round-trip time applied once per call
    latency: Duration,
    commands: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            latency: Duration::ZERO,
            commands: AtomicU64::new(0),
        }
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that delays every call by `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.read().values().filter(|s| !s.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total commands processed, pipelined ones included
    pub fn commands_processed(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn count(&self, n: u64) {
        self.commands.fetch_add(n, Ordering::Relaxed);
    }

    /// Read a live slot, ignoring expired ones.
    fn read_slot<T>(&self, key: &str, f: impl FnOnce(Option<&Slot>) -> T) -> T {
        let now = Instant::now();
        let data = self.data.read();
        f(data.get(key).filter(|s| !s.is_expired(now)))
    }

    fn apply(&self, command: &Command) -> Result<Reply> {
        let now = Instant::now();
        let mut data = self.data.write();
        purge(&mut data, command, now);

        match command {
            Command::Set { key, value, ttl } => {
                let mut slot = Slot::new(Value::String(value.clone()));
                slot.expires_at = ttl.map(|t| now + t);
                data.insert(key.clone(), slot);
                Ok(Reply::ok())
            }
            Command::HSet { key, fields } => {
                if fields.is_empty() {
                    return Err(Error::store(
                        "HSET",
                        "ERR wrong number of arguments for 'hset' command",
                    ));
                }
                let slot = data
                    .entry(key.clone())
                    .or_insert_with(|| Slot::new(Value::Hash(HashMap::new())));
                let Value::Hash(hash) = &mut slot.value else {
                    return Err(Error::store("HSET", WRONGTYPE));
                };
                let mut added = 0;
                for (field, value) in fields {
                    if hash.insert(field.clone(), value.clone()).is_none() {
                        added += 1;
                    }
                }
                Ok(Reply::Integer(added))
            }
            Command::HDel { key, fields } => {
                let Some(slot) = data.get_mut(key) else {
                    return Ok(Reply::Integer(0));
                };
                let Value::Hash(hash) = &mut slot.value else {
                    return Err(Error::store("HDEL", WRONGTYPE));
                };
                let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
                if hash.is_empty() {
                    data.remove(key);
                }
                Ok(Reply::Integer(removed as i64))
            }
            Command::Rename { from, to } => {
                let Some(slot) = data.remove(from) else {
                    return Err(Error::store("RENAME", "ERR no such key"));
                };
                data.insert(to.clone(), slot);
                Ok(Reply::ok())
            }
            Command::PExpire { key, ttl } => match data.get_mut(key) {
                Some(slot) => {
                    slot.expires_at = Some(now + *ttl);
                    Ok(Reply::Integer(1))
                }
                None => Ok(Reply::Integer(0)),
            },
            Command::Del { keys } => {
                let removed = keys.iter().filter(|k| data.remove(*k).is_some()).count();
                Ok(Reply::Integer(removed as i64))
            }
        }
    }
}

/// Drop expired slots a command is about to touch.
fn purge(data: &mut HashMap<String, Slot>, command: &Command, now: Instant) {
    let keys: Vec<&String> = match command {
        Command::Set { key, .. }
        | Command::HSet { key, .. }
        | Command::HDel { key, .. }
        | Command::PExpire { key, .. } => vec![key],
        Command::Rename { from, to } => vec![from, to],
        Command::Del { keys } => keys.iter().collect(),
    };
    for key in keys {
        if data.get(key).is_some_and(|s| s.is_expired(now)) {
            data.remove(key);
        }
    }
}

/// Glob-style match supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.round_trip().await;
        self.count(1);
        self.read_slot(key, |slot| match slot.map(|s| &s.value) {
            None => Ok(None),
            Some(Value::String(b)) => Ok(Some(b.clone())),
            Some(Value::Hash(_)) => Err(Error::store("GET", WRONGTYPE)),
        })
    }

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.round_trip().await;
        self.count(1);
        self.apply(&Command::Set {
            key: key.to_string(),
            value,
            ttl: Some(ttl),
        })
        .map(|_| ())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        self.round_trip().await;
        self.count(1);
        self.read_slot(key, |slot| match slot.map(|s| &s.value) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(h.get(field).cloned()),
            Some(Value::String(_)) => Err(Error::store("HGET", WRONGTYPE)),
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        self.round_trip().await;
        self.count(1);
        self.read_slot(key, |slot| match slot.map(|s| &s.value) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(h)) => Ok(h.clone()),
            Some(Value::String(_)) => Err(Error::store("HGETALL", WRONGTYPE)),
        })
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.round_trip().await;
        self.count(1);
        let now = Instant::now();
        Ok(self.read_slot(key, |slot| match slot {
            None => KeyTtl::Missing,
            Some(Slot {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Slot {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(now)),
        }))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.round_trip().await;
        self.count(1);
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .data
            .read()
            .iter()
            .filter(|(k, s)| !s.is_expired(now) && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.round_trip().await;
        self.count(1);
        let reply = self.apply(&Command::Del {
            keys: keys.to_vec(),
        })?;
        Ok(reply.as_integer().unwrap_or(0) as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.round_trip().await;
        Ok(())
    }

    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        self.round_trip().await;
        self.count(pipeline.len() as u64);

        let mut replies = Vec::with_capacity(pipeline.len());
        let mut first_error = None;
        for command in pipeline.commands() {
            match self.apply(command) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    trace!(command = command.name(), error = %e, "Pipelined command failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(replies),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

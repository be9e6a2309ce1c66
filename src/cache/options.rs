//! Cache options and per-operation timeout budgets.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default expiry applied to written keys (10 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Default namespace prefix
pub const DEFAULT_KEY_PREFIX: &str = "app";

/// Default ceiling for single-key and single-field reads
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(300);

/// Default ceiling for single-key writes
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default ceiling for pipelined rebuilds
pub const DEFAULT_PIPELINE_TIMEOUT: Duration = Duration::from_secs(1);

/// Cache configuration.
///
/// Fields left at their zero value are replaced by the defaults above when
/// the cache handle is built (see [`CacheOptions::with_defaults`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Expiry applied to written keys
    pub ttl: Duration,
    /// Namespace prefix for every key built by the cache
    pub key_prefix: String,
    /// Ceiling for single-key/field reads
    pub read_timeout: Duration,
    /// Ceiling for single-key writes
    pub write_timeout: Duration,
    /// Ceiling for multi-command rebuilds
    pub pipeline_timeout: Duration,
}

impl CacheOptions {
    /// Replace every zero-valued option with its default.
    pub fn with_defaults(mut self) -> Self {
        if self.ttl.is_zero() {
            self.ttl = DEFAULT_TTL;
        }
        if self.key_prefix.is_empty() {
            self.key_prefix = DEFAULT_KEY_PREFIX.to_string();
        }
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
        if self.pipeline_timeout.is_zero() {
            self.pipeline_timeout = DEFAULT_PIPELINE_TIMEOUT;
        }
        self
    }

    /// The timeout ceilings carried by these options.
    pub fn budget(&self) -> TimeoutBudget {
        TimeoutBudget {
            read: self.read_timeout,
            write: self.write_timeout,
            pipeline: self.pipeline_timeout,
        }
    }
}

/// Class of store interaction, each with its own ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Pipeline,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Pipeline => "pipeline",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolved, immutable time ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudget {
    pub read: Duration,
    pub write: Duration,
    pub pipeline: Duration,
}

impl TimeoutBudget {
    pub fn for_operation(&self, op: Operation) -> Duration {
        match op {
            Operation::Read => self.read,
            Operation::Write => self.write,
            Operation::Pipeline => self.pipeline,
        }
    }

    /// Drive `fut` under the ceiling for `op`.
    ///
    /// The deadline is armed when this is awaited and is dropped together
    /// with the future on every exit path. When it elapses the in-flight
    /// store call is abandoned and `Error::Timeout` is returned.
    pub async fn run<T, F>(&self, op: Operation, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let budget = self.for_operation(op);
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: op.name(),
                budget,
            }),
        }
    }
}

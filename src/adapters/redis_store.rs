//! Redis Store Adapter
//!
//! Implements the `KvStore` port on top of the `redis` crate.
//!
//! All calls share one multiplexed [`ConnectionManager`]. Each call clones the
//! manager and sends its own request, so concurrent callers never wait for
//! each other's round trips, and a caller dropped by its deadline leaves the
//! connection usable for everyone else. The manager reconnects on its own
//! after the connection is lost.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::{IntoConnectionInfo, RedisError, Value};
use tracing::{debug, instrument};

use crate::domain::ports::{Command, KeyTtl, KvStore, Pipeline, Reply};
use crate::error::{Error, Result};

/// Connection settings for [`RedisStore`]
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// `host:port` or a full `redis://` URL
    pub addr: String,
    /// Password sent with AUTH after connecting
    pub password: Option<String>,
    /// Logical database selected after connecting
    pub database: i64,
    /// Ceiling for establishing the connection
    pub connect_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            password: None,
            database: 0,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisStoreConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    /// Connection URL for `addr`, adding the `redis://` scheme when missing.
    pub fn url(&self) -> String {
        if self.addr.contains("://") {
            self.addr.clone()
        } else {
            format!("redis://{}", self.addr)
        }
    }

    fn connection_info(&self) -> Result<redis::ConnectionInfo> {
        let mut info = self
            .url()
            .as_str()
            .into_connection_info()
            .map_err(|e| map_error("CONNECT", e))?;
        if self.password.is_some() {
            info.redis.password = self.password.clone();
        }
        if self.database != 0 {
            info.redis.db = self.database;
        }
        Ok(info)
    }
}

/// Redis-backed store
#[derive(Clone)]
pub struct RedisStore {
    config: RedisStoreConfig,
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.config.addr)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect, authenticate and select the configured database.
    #[instrument(skip(config), fields(addr = %config.addr))]
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        let client =
            redis::Client::open(config.connection_info()?).map_err(|e| map_error("CONNECT", e))?;

        let conn = tokio::time::timeout(config.connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| Error::Timeout {
                operation: "connect",
                budget: config.connect_timeout,
            })?
            .map_err(|e| map_error("CONNECT", e))?;

        debug!("Connected to store");
        Ok(Self { config, conn })
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: redis::Cmd, name: &str) -> Result<T> {
        let mut conn = self.conn.clone();
        cmd.query_async::<_, T>(&mut conn)
            .await
            .map_err(|e| map_error(name, e))
    }
}

/// Build the wire command for a port command.
fn to_cmd(command: &Command) -> redis::Cmd {
    let mut args = command.to_args().into_iter();
    let mut cmd = match args.next() {
        Some(name) => redis::cmd(&String::from_utf8_lossy(&name)),
        None => redis::Cmd::new(),
    };
    for arg in args {
        cmd.arg(&arg[..]);
    }
    cmd
}

fn map_error(command: &str, e: RedisError) -> Error {
    match e.kind() {
        redis::ErrorKind::IoError => Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)),
        redis::ErrorKind::TypeError => Error::Protocol(e.to_string()),
        _ => Error::store(command, e.to_string()),
    }
}

fn to_reply(value: Value) -> Result<Reply> {
    match value {
        Value::Nil => Ok(Reply::Nil),
        Value::Int(n) => Ok(Reply::Integer(n)),
        Value::Data(b) => Ok(Reply::Data(Bytes::from(b))),
        Value::Bulk(items) => items
            .into_iter()
            .map(to_reply)
            .collect::<Result<Vec<_>>>()
            .map(Reply::Array),
        Value::Status(s) => Ok(Reply::Status(s)),
        Value::Okay => Ok(Reply::ok()),
        other => Err(Error::Protocol(format!("unsupported reply {:?}", other))),
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let raw: Option<Vec<u8>> = self.query(redis::cmd("GET").arg(key).clone(), "GET").await?;
        Ok(raw.map(Bytes::from))
    }

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let command = Command::Set {
            key: key.to_string(),
            value,
            ttl: Some(ttl),
        };
        let _: () = self.query(to_cmd(&command), "SET").await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        let raw: Option<Vec<u8>> = self
            .query(redis::cmd("HGET").arg(key).arg(field).clone(), "HGET")
            .await?;
        Ok(raw.map(Bytes::from))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        let raw: HashMap<String, Vec<u8>> = self
            .query(redis::cmd("HGETALL").arg(key).clone(), "HGETALL")
            .await?;
        Ok(raw.into_iter().map(|(f, v)| (f, Bytes::from(v))).collect())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let ms: i64 = self.query(redis::cmd("PTTL").arg(key).clone(), "PTTL").await?;
        Ok(KeyTtl::from_pttl(ms))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.query(redis::cmd("KEYS").arg(pattern).clone(), "KEYS")
            .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let command = Command::Del {
            keys: keys.to_vec(),
        };
        let removed: i64 = self.query(to_cmd(&command), "DEL").await?;
        Ok(removed.max(0) as u64)
    }

    async fn ping(&self) -> Result<()> {
        let _: String = self.query(redis::cmd("PING"), "PING").await?;
        Ok(())
    }

    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        if pipeline.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for command in pipeline.commands() {
            pipe.add_command(to_cmd(command));
        }

        let mut conn = self.conn.clone();
        let values: Vec<Value> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("PIPELINE", e))?;
        values.into_iter().map(to_reply).collect()
    }
}

//! swapcache command-line client
//!
//! Inspects and rebuilds cache entries on a Redis-compatible server.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │     Args     │───▶│    Cache     │───▶│  RedisStore  │───▶ server
//! │  (clap/env)  │    │  (budgets)   │    │ (multiplexed)│
//! └──────────────┘    └──────────────┘    └──────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swapcache::cache::{Keyspace, Operation};
use swapcache::{normalize, Cache, CacheOptions, RedisStore, RedisStoreConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// swapcache - atomic hash rebuilds and typed reads over Redis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address (host:port or redis:// URL)
    #[arg(long, env = "SWAPCACHE_ADDR", default_value = "127.0.0.1:6379")]
    addr: String,

    /// Password sent with AUTH
    #[arg(long, env = "SWAPCACHE_PASSWORD")]
    password: Option<String>,

    /// Logical database index
    #[arg(long, env = "SWAPCACHE_DATABASE", default_value = "0")]
    database: i64,

    /// Entry lifetime in seconds (0 uses the default)
    #[arg(long, env = "SWAPCACHE_TTL_SECS", default_value = "0")]
    ttl_secs: u64,

    /// Namespace prefix for keys built with `key`
    #[arg(long, env = "SWAPCACHE_KEY_PREFIX", default_value = "")]
    key_prefix: String,

    /// Read deadline in milliseconds (0 uses the default)
    #[arg(long, env = "SWAPCACHE_READ_TIMEOUT_MS", default_value = "0")]
    read_timeout_ms: u64,

    /// Write deadline in milliseconds (0 uses the default)
    #[arg(long, env = "SWAPCACHE_WRITE_TIMEOUT_MS", default_value = "0")]
    write_timeout_ms: u64,

    /// Pipeline deadline in milliseconds (0 uses the default)
    #[arg(long, env = "SWAPCACHE_PIPELINE_TIMEOUT_MS", default_value = "0")]
    pipeline_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the namespaced key built from PARTS
    Key {
        #[arg(required = true)]
        parts: Vec<String>,
    },
    /// Print TEXT normalized
    Normalize { text: String },
    /// Check connectivity
    Ping,
    /// Print the JSON snapshot stored at KEY
    Get { key: String },
    /// Store a JSON snapshot at KEY
    Set { key: String, json: String },
    /// Print one field of the hash at KEY
    Hget {
        key: String,
        field: String,
        /// Decode the field as JSON and pretty-print it
        #[arg(long)]
        json: bool,
    },
    /// Atomically rebuild the hash at KEY from FIELD=VALUE pairs
    Replace {
        key: String,
        #[arg(value_name = "FIELD=VALUE")]
        pairs: Vec<String>,
    },
    /// Atomically rebuild the hash at KEY from a JSON object
    ReplaceJson {
        key: String,
        #[arg(value_name = "JSON-OBJECT")]
        object: String,
    },
}

impl Cmd {
    /// Output of commands that need no store connection.
    fn offline_output(&self, options: &CacheOptions) -> Option<String> {
        match self {
            Cmd::Key { parts } => Some(Keyspace::new(&options.key_prefix).key(parts)),
            Cmd::Normalize { text } => Some(normalize(text)),
            _ => None,
        }
    }
}

impl Args {
    fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            ttl: Duration::from_secs(self.ttl_secs),
            key_prefix: self.key_prefix.clone(),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            pipeline_timeout: Duration::from_millis(self.pipeline_timeout_ms),
        }
        .with_defaults()
    }

    fn store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            password: self.password.clone(),
            database: self.database,
            ..RedisStoreConfig::new(self.addr.clone())
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let options = args.cache_options();
    debug!(
        addr = %args.addr,
        database = args.database,
        ttl = ?options.ttl,
        prefix = %options.key_prefix,
        "Resolved configuration"
    );

    if let Some(line) = args.command.offline_output(&options) {
        println!("{line}");
        return Ok(());
    }

    let store = RedisStore::connect(args.store_config())
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    let cache = Cache::new(Arc::new(store), options);

    run(&cache, args.command).await
}

async fn run(cache: &Cache, command: Cmd) -> anyhow::Result<()> {
    if let Some(line) = command.offline_output(cache.options()) {
        println!("{line}");
        return Ok(());
    }

    match command {
        Cmd::Key { .. } | Cmd::Normalize { .. } => {}
        Cmd::Ping => {
            cache
                .budget()
                .run(Operation::Read, cache.store().ping())
                .await
                .context("ping failed")?;
            println!("PONG");
        }
        Cmd::Get { key } => match cache.try_get_snapshot::<Value>(&key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("(nil)"),
        },
        Cmd::Set { key, json } => {
            let value: Value = serde_json::from_str(&json).context("invalid JSON value")?;
            cache.set_snapshot(&key, &value).await?;
            info!(key = %key, "Snapshot stored");
            println!("OK");
        }
        Cmd::Hget { key, field, json } => {
            let text = if json {
                cache
                    .hget_encoded::<Value>(&key, &field)
                    .await?
                    .map(|v| serde_json::to_string_pretty(&v))
                    .transpose()?
            } else {
                cache.hget_string(&key, &field).await?
            };
            println!("{}", text.as_deref().unwrap_or("(nil)"));
        }
        Cmd::Replace { key, pairs } => {
            let fields = parse_pairs(&pairs)?;
            let outcome = cache.atomic_replace_hash(&key, fields).await?;
            println!("{} fields published", outcome.staged);
        }
        Cmd::ReplaceJson { key, object } => {
            let fields: Map<String, Value> =
                serde_json::from_str(&object).context("expected a JSON object")?;
            let outcome = cache.atomic_replace_hash_encoded(&key, fields).await?;
            for skipped in &outcome.skipped {
                warn!(field = %skipped.field, reason = %skipped.reason, "Field skipped");
            }
            println!(
                "{} fields published, {} skipped",
                outcome.staged,
                outcome.skipped.len()
            );
        }
    }
    Ok(())
}

fn parse_pairs(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    let mut fields = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let Some((field, value)) = pair.split_once('=') else {
            bail!("expected FIELD=VALUE, got {pair:?}");
        };
        if field.is_empty() {
            bail!("empty field name in {pair:?}");
        }
        fields.push((field.to_string(), value.to_string()));
    }
    Ok(fields)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

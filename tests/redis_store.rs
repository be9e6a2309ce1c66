//! RedisStore tests against a local RESP2 server backed by `MemoryStore`.
//!
//! The server answers each command a fixed delay after it arrives, like a
//! distant store would, without holding back the commands queued behind it.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use redis::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

use swapcache::cache::Keyspace;
use swapcache::domain::{Command, KeyTtl, Pipeline, Reply};
use swapcache::{
    Cache, CacheOptions, Error, ErrorKind, KvStore, MemoryStore, RedisStore, RedisStoreConfig,
};

// =============================================================================
// Test Server
// =============================================================================

struct TestServer {
    addr: String,
    backend: Arc<MemoryStore>,
}

impl TestServer {
    async fn start(latency: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let backend = Arc::new(MemoryStore::new());

        let store = backend.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, store.clone(), latency));
            }
        });

        Self { addr, backend }
    }

    async fn store(&self) -> RedisStore {
        RedisStore::connect(RedisStoreConfig::new(self.addr.clone()))
            .await
            .unwrap()
    }
}

async fn serve(stream: TcpStream, store: Arc<MemoryStore>, latency: Duration) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, Vec<u8>)>();

    tokio::spawn(async move {
        while let Some((due, out)) = rx.recv().await {
            tokio::time::sleep_until(due).await;
            if writer.write_all(&out).await.is_err() {
                return;
            }
        }
    });

    let mut buf = Vec::new();
    loop {
        let mut cursor = Cursor::new(&buf[..]);
        match redis::Parser::new().parse_value(&mut cursor) {
            Ok(request) => {
                let used = cursor.position() as usize;
                buf.drain(..used);

                let due = Instant::now() + latency;
                let out = dispatch(&store, request).await;
                if tx.send((due, out)).is_err() {
                    return;
                }
            }
            // Incomplete request
            Err(_) => {
                let mut chunk = [0u8; 4096];
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
        }
    }
}

fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Nil => out.extend_from_slice(b"$-1\r\n"),
        Value::Int(n) => out.extend_from_slice(format!(":{n}\r\n").as_bytes()),
        Value::Data(b) => {
            out.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
            out.extend_from_slice(b);
            out.extend_from_slice(b"\r\n");
        }
        Value::Bulk(items) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode(item, out);
            }
        }
        Value::Status(s) => out.extend_from_slice(format!("+{s}\r\n").as_bytes()),
        Value::Okay => out.extend_from_slice(b"+OK\r\n"),
        other => panic!("cannot encode {other:?}"),
    }
}

fn error_reply(message: &str) -> Vec<u8> {
    format!("-{message}\r\n").into_bytes()
}

/// Run one request against the backend and return the encoded reply.
async fn dispatch(store: &MemoryStore, request: Value) -> Vec<u8> {
    let Value::Bulk(items) = request else {
        return error_reply("ERR expected an array");
    };
    let args: Vec<Bytes> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Data(b) => Some(Bytes::from(b)),
            _ => None,
        })
        .collect();
    let text = |i: usize| {
        args.get(i)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    };
    let name = text(0).to_uppercase();

    let result = match name.as_str() {
        "PING" => Ok(Value::Status("PONG".into())),
        "CLIENT" | "SELECT" | "AUTH" => Ok(Value::Okay),
        "GET" => store.get(&text(1)).await.map(data_or_nil),
        "HGET" => store.hget(&text(1), &text(2)).await.map(data_or_nil),
        "HGETALL" => store.hgetall(&text(1)).await.map(|h| {
            Value::Bulk(
                h.into_iter()
                    .flat_map(|(f, v)| [Value::Data(f.into_bytes()), Value::Data(v.to_vec())])
                    .collect(),
            )
        }),
        "PTTL" => store.ttl(&text(1)).await.map(|ttl| {
            Value::Int(match ttl {
                KeyTtl::Missing => -2,
                KeyTtl::Persistent => -1,
                KeyTtl::Expires(d) => d.as_millis() as i64,
            })
        }),
        "KEYS" => store.keys(&text(1)).await.map(|keys| {
            Value::Bulk(keys.into_iter().map(|k| Value::Data(k.into_bytes())).collect())
        }),
        _ => match parse_write(&name, &args) {
            Some(command) => {
                let mut pipe = Pipeline::new();
                pipe.push(command);
                store
                    .execute(pipe)
                    .await
                    .map(|mut replies| to_value(replies.pop().unwrap_or(Reply::Nil)))
            }
            None => return error_reply(&format!("ERR unknown command '{name}'")),
        },
    };

    match result {
        Ok(value) => {
            let mut out = Vec::new();
            encode(&value, &mut out);
            out
        }
        Err(Error::Store { message, .. }) => error_reply(&message),
        Err(other) => error_reply(&format!("ERR {other}")),
    }
}

fn parse_write(name: &str, args: &[Bytes]) -> Option<Command> {
    let text = |b: &Bytes| String::from_utf8_lossy(b).into_owned();
    let millis = |b: &Bytes| text(b).parse::<u64>().ok().map(Duration::from_millis);
    let key = text(args.get(1)?);
    match name {
        "SET" => Some(Command::Set {
            key,
            value: args.get(2)?.clone(),
            ttl: args.get(4).and_then(millis),
        }),
        "HSET" => Some(Command::HSet {
            key,
            fields: args[2..]
                .chunks(2)
                .filter(|pair| pair.len() == 2)
                .map(|pair| (text(&pair[0]), pair[1].clone()))
                .collect(),
        }),
        "HDEL" => Some(Command::HDel {
            key,
            fields: args[2..].iter().map(text).collect(),
        }),
        "RENAME" => Some(Command::Rename {
            from: key,
            to: text(args.get(2)?),
        }),
        "PEXPIRE" => Some(Command::PExpire {
            key,
            ttl: millis(args.get(2)?)?,
        }),
        "DEL" => Some(Command::Del {
            keys: args[1..].iter().map(text).collect(),
        }),
        _ => None,
    }
}

fn data_or_nil(value: Option<Bytes>) -> Value {
    value.map_or(Value::Nil, |b| Value::Data(b.to_vec()))
}

fn to_value(reply: Reply) -> Value {
    match reply {
        Reply::Status(s) => Value::Status(s),
        Reply::Integer(n) => Value::Int(n),
        Reply::Data(b) => Value::Data(b.to_vec()),
        Reply::Array(items) => Value::Bulk(items.into_iter().map(to_value).collect()),
        Reply::Nil => Value::Nil,
    }
}

// =============================================================================
// Adapter Tests
// =============================================================================

#[tokio::test]
async fn test_connect_and_ping() {
    let server = TestServer::start(Duration::ZERO).await;
    server.store().await.ping().await.unwrap();
}

#[tokio::test]
async fn test_scalar_commands() {
    let server = TestServer::start(Duration::ZERO).await;
    let store = server.store().await;

    assert_eq!(store.get("k").await.unwrap(), None);
    store
        .set_with_ttl("k", Bytes::from_static(b"v"), Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));

    let ttl = store.ttl("k").await.unwrap().remaining().unwrap();
    assert!(ttl <= Duration::from_secs(30));
    assert_eq!(store.ttl("missing").await.unwrap(), KeyTtl::Missing);

    assert_eq!(
        store
            .delete(&["k".to_string(), "nope".to_string()])
            .await
            .unwrap(),
        1
    );
    assert!(server.backend.is_empty());
}

#[tokio::test]
async fn test_pipeline_failure_is_store_error() {
    let server = TestServer::start(Duration::ZERO).await;
    let store = server.store().await;

    let mut pipe = Pipeline::new();
    pipe.rename("absent", "dest")
        .hset("h", vec![("f".to_string(), Bytes::from_static(b"1"))]);
    let err = store.execute(pipe).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);

    // The batch is not rolled back.
    assert_eq!(
        store.hget("h", "f").await.unwrap(),
        Some(Bytes::from_static(b"1"))
    );
}

#[tokio::test]
async fn test_wrong_type_is_store_error() {
    let server = TestServer::start(Duration::ZERO).await;
    let store = server.store().await;
    store
        .set_with_ttl("s", Bytes::from_static(b"1"), Duration::from_secs(30))
        .await
        .unwrap();

    let err = store.hgetall("s").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
}

// =============================================================================
// Deadlines
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_each_get_their_own_budget() {
    let server = TestServer::start(Duration::from_millis(150)).await;
    let cache = Cache::new(Arc::new(server.store().await), CacheOptions::default());
    assert_eq!(cache.budget().read, Duration::from_millis(300));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = cache.hget_string("app:h", "f").await;
                (result, started.elapsed())
            })
        })
        .collect();

    for (caller, handle) in futures::future::join_all(readers)
        .await
        .into_iter()
        .enumerate()
    {
        let (result, elapsed) = handle.unwrap();
        assert_eq!(result.unwrap(), None, "caller {caller}");
        assert!(elapsed < Duration::from_millis(300), "caller {caller}: {elapsed:?}");
    }
    assert_eq!(cache.stats().timeouts, 0);
}

#[tokio::test]
async fn test_timed_out_call_leaves_connection_usable() {
    let server = TestServer::start(Duration::from_millis(100)).await;
    let store = Arc::new(server.store().await);
    server
        .backend
        .set_with_ttl("app:k", Bytes::from_static(b"1"), Duration::from_secs(60))
        .await
        .unwrap();

    let impatient = Cache::new(
        store.clone(),
        CacheOptions {
            read_timeout: Duration::from_millis(20),
            ..Default::default()
        },
    );
    let err = impatient.try_get_snapshot::<u8>("app:k").await.unwrap_err();
    assert!(err.is_timeout());

    // The late reply to the abandoned call must not answer this one.
    let patient = Cache::new(store, CacheOptions::default());
    assert_eq!(
        patient.try_get_snapshot::<u8>("app:missing").await.unwrap(),
        None
    );
    assert_eq!(patient.try_get_snapshot::<u8>("app:k").await.unwrap(), Some(1));
}

// =============================================================================
// Cache over Redis
// =============================================================================

#[tokio::test]
async fn test_cache_end_to_end() {
    let server = TestServer::start(Duration::ZERO).await;
    let cache = Cache::new(
        Arc::new(server.store().await),
        CacheOptions {
            ttl: Duration::from_secs(60),
            key_prefix: "e2e".into(),
            ..Default::default()
        },
    );
    let key = cache.key(["group", "name2id"]);

    cache
        .atomic_replace_hash(&key, [("backend", "9"), ("mobile", "3")])
        .await
        .unwrap();
    cache
        .atomic_replace_hash(&key, [("backend", "9"), ("frontend", "1")])
        .await
        .unwrap();

    assert_eq!(
        cache.hget_string(&key, "frontend").await.unwrap().as_deref(),
        Some("1")
    );
    assert_eq!(cache.hget_string(&key, "mobile").await.unwrap(), None);
    assert!(server
        .backend
        .keys(&Keyspace::staging_pattern(&key))
        .await
        .unwrap()
        .is_empty());

    cache
        .atomic_replace_hash(&key, Vec::<(String, String)>::new())
        .await
        .unwrap();
    assert!(cache.store().hgetall(&key).await.unwrap().is_empty());

    let snap = cache.key(["snap"]);
    cache.set_snapshot(&snap, &vec![1, 2, 3]).await.unwrap();
    assert_eq!(
        cache.try_get_snapshot::<Vec<i32>>(&snap).await.unwrap(),
        Some(vec![1, 2, 3])
    );
    assert_matches::assert_matches!(
        cache.remaining_ttl(&snap).await.unwrap(),
        KeyTtl::Expires(d) if d <= Duration::from_secs(60)
    );
}

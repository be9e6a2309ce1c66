//! Single-field reads from a hash.

use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::codec;
use super::options::Operation;
use super::stats::Lookup;
use super::Cache;
use crate::error::{Error, Result};

impl Cache {
    /// Load and decode one field of the hash at `key`.
    ///
    /// Returns `Ok(None)` when the key or the field is absent.
    #[instrument(skip(self), fields(key = %key, field = %field))]
    pub async fn hget_encoded<T>(&self, key: &str, field: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(raw) = self.fetch_field(key, field).await? else {
            return Ok(None);
        };

        match codec::decode(key, &raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(error = %e, "Hash field failed to decode");
                self.stats.record_decode_error();
                Err(e)
            }
        }
    }

    /// Load one field of the hash at `key` as raw text.
    #[instrument(skip(self), fields(key = %key, field = %field))]
    pub async fn hget_string(&self, key: &str, field: &str) -> Result<Option<String>> {
        let Some(raw) = self.fetch_field(key, field).await? else {
            return Ok(None);
        };

        String::from_utf8(raw.to_vec())
            .map(Some)
            .map_err(|_| Error::InvalidUtf8 {
                key: key.to_string(),
            })
    }

    async fn fetch_field(&self, key: &str, field: &str) -> Result<Option<bytes::Bytes>> {
        let raw = self
            .bounded(Operation::Read, self.store.hget(key, field))
            .await?;
        match raw {
            Some(_) => self.stats.record_hit(Lookup::Field),
            None => self.stats.record_miss(Lookup::Field),
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::MemoryStore;
    use crate::cache::{Cache, CacheOptions};
    use crate::domain::ports::{KvStore, Pipeline};
    use crate::error::{Error, ErrorKind};
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Group {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn test_hget_encoded() {
        let cache = Cache::in_memory(CacheOptions::default());
        let key = cache.key(["group", "by_id"]);
        let groups = vec![
            ("9".to_string(), Group { id: 9, name: "Backend".into() }),
            ("3".to_string(), Group { id: 3, name: "Mobile".into() }),
        ];
        cache.atomic_replace_hash_encoded(&key, groups).await.unwrap();

        let g: Option<Group> = cache.hget_encoded(&key, "9").await.unwrap();
        assert_eq!(g, Some(Group { id: 9, name: "Backend".into() }));

        let missing: Option<Group> = cache.hget_encoded(&key, "404").await.unwrap();
        assert_eq!(missing, None);

        let stats = cache.stats();
        assert_eq!(stats.field_hits, 1);
        assert_eq!(stats.field_misses, 1);
    }

    #[tokio::test]
    async fn test_hget_on_missing_key_is_none() {
        let cache = Cache::in_memory(CacheOptions::default());

        assert_eq!(cache.hget_string("app:none", "f").await.unwrap(), None);
        assert_eq!(cache.hget_encoded::<Group>("app:none", "f").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hget_string_returns_raw_text() {
        let cache = Cache::in_memory(CacheOptions::default());
        let key = cache.key(["group", "name2id"]);
        cache
            .atomic_replace_hash(&key, [("backend", "9"), ("frontend", "1")])
            .await
            .unwrap();

        assert_eq!(
            cache.hget_string(&key, "frontend").await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_hget_string_rejects_invalid_utf8() {
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::new(store.clone(), CacheOptions::default());
        let mut pipe = Pipeline::new();
        pipe.hset(
            "app:bin",
            vec![("f".to_string(), Bytes::from_static(&[0xff, 0xfe]))],
        );
        store.execute(pipe).await.unwrap();

        let err = cache.hget_string("app:bin", "f").await.unwrap_err();
        assert_matches!(err, Error::InvalidUtf8 { ref key } if key == "app:bin");
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_hget_encoded_decode_error() {
        let cache = Cache::in_memory(CacheOptions::default());
        cache
            .atomic_replace_hash("app:h", [("f", "{broken")])
            .await
            .unwrap();

        let err = cache.hget_encoded::<Group>("app:h", "f").await.unwrap_err();
        assert_matches!(err, Error::Decode { .. });
        assert_eq!(cache.stats().decode_errors, 1);
    }

    #[tokio::test]
    async fn test_hget_on_scalar_key_is_store_error() {
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::new(store.clone(), CacheOptions::default());
        store
            .set_with_ttl("app:s", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await
            .unwrap();

        let err = cache.hget_string("app:s", "f").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(200)));
        let cache = Cache::new(
            store,
            CacheOptions {
                read_timeout: Duration::from_millis(10),
                ..Default::default()
            },
        );

        let err = cache.hget_string("app:h", "f").await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}

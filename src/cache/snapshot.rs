//! Whole-value snapshots stored under a scalar key.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use super::codec;
use super::options::Operation;
use super::stats::Lookup;
use super::Cache;
use crate::error::Result;

impl Cache {
    /// Store `value` as JSON under `key` with the configured ttl.
    ///
    /// Encoding happens before any store call; an unencodable value leaves
    /// the key untouched.
    #[instrument(skip(self, value), fields(key = %key))]
    pub async fn set_snapshot<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let raw = codec::encode(value)?;
        let size = raw.len();
        self.bounded(
            Operation::Write,
            self.store.set_with_ttl(key, raw, self.options.ttl),
        )
        .await?;
        debug!(bytes = size, "Stored snapshot");
        Ok(())
    }

    /// Load and decode the snapshot at `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or expired.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn try_get_snapshot<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(raw) = self.bounded(Operation::Read, self.store.get(key)).await? else {
            self.stats.record_miss(Lookup::Snapshot);
            return Ok(None);
        };

        match codec::decode(key, &raw) {
            Ok(value) => {
                self.stats.record_hit(Lookup::Snapshot);
                Ok(Some(value))
            }
            Err(e) => {
                debug!(error = %e, "Snapshot failed to decode");
                self.stats.record_decode_error();
                Err(e)
            }
        }
    }
}

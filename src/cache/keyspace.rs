//! Keyspace addressing.
//!
//! Keys are `prefix:part:part:...`. Parts are joined verbatim: a part that
//! itself contains `:` produces a key indistinguishable from one built with
//! more parts, so callers must keep the separator out of their segments.

use uuid::Uuid;

/// Separator between key segments
pub const KEY_SEPARATOR: &str = ":";

/// Tag inserted between a destination key and a staging token
pub const STAGING_TAG: &str = "tmp";

/// Builds namespaced keys from a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Join the prefix and `parts` with [`KEY_SEPARATOR`], preserving order.
    pub fn key<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push_str(KEY_SEPARATOR);
            key.push_str(part.as_ref());
        }
        key
    }

    /// A fresh, globally unique staging key for `destination`.
    pub fn staging_key(destination: &str) -> String {
        format!(
            "{destination}{sep}{STAGING_TAG}{sep}{token}",
            sep = KEY_SEPARATOR,
            token = Uuid::new_v4()
        )
    }

    /// Glob pattern matching every staging key of `destination`.
    pub fn staging_pattern(destination: &str) -> String {
        format!("{destination}{sep}{STAGING_TAG}{sep}*", sep = KEY_SEPARATOR)
    }

    pub fn is_staging_key(key: &str) -> bool {
        key.contains(&format!("{sep}{STAGING_TAG}{sep}", sep = KEY_SEPARATOR))
    }
}

//! State store abstraction.
//!
//! The [`StateStore`] trait is a small key → JSON document store: every
//! value is replaced wholesale on write, there is no partial update and no
//! schema versioning. Callers read with a default when a key is missing.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. The
//! main crate provides a SQLite-backed store; [`memory::InMemoryStore`] is
//! used in tests.

pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Well-known keys.
pub mod keys {
    pub const HISTORY_DATA: &str = "historyData";
    pub const TAG_STATE: &str = "tagState";
    pub const TAG_DIRTY: &str = "tagDirty";
    pub const PYTHON_ANALYSIS: &str = "pythonAnalysis";
    pub const LAST_RSS_RESULTS: &str = "lastRssResults";
    pub const INSTALLED_AT: &str = "installedAt";
}

/// Abstract key/value document store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](StateStore::get) | Read one document |
/// | [`set`](StateStore::set) | Replace one document |
/// | [`set_many`](StateStore::set_many) | Replace several documents at once |
/// | [`remove`](StateStore::remove) | Delete a document |
/// | [`keys`](StateStore::keys) | List stored keys |
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        for (key, value) in entries {
            self.set(&key, value).await?;
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()>;

    async fn keys(&self) -> Result<Vec<String>>;
}

/// Read and decode a document. A document that no longer matches `T` is
/// an error, not a silent default.
pub async fn get_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .with_context(|| format!("stored value for '{}' has an unexpected shape", key)),
    }
}

/// Read a document, falling back to `default` when missing or malformed.
pub async fn get_or<T: DeserializeOwned>(store: &dyn StateStore, key: &str, default: T) -> Result<T> {
    Ok(match store.get(key).await? {
        Some(value) => serde_json::from_value(value).unwrap_or(default),
        None => default,
    })
}

pub async fn put_json<T: Serialize + Sync + ?Sized>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.set(key, value).await
}

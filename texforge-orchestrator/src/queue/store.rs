//! Shared store
//!
//! The queue front door keeps job records, the pending queue and artifact
//! shadow keys in a key/value store shared by the front door, the worker and
//! the sweeper. The store is treated as linearizable per key; nothing here
//! layers its own consistency protocol on top.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use texforge_core::domain::job::JobId;

/// List the front door pushes job IDs onto
pub const QUEUE_KEY: &str = "queue";

/// Prefix of job record keys
pub const RECORD_PREFIX: &str = "req:";

/// Prefix of artifact shadow keys
pub const ARTIFACT_PREFIX: &str = "pdf:";

pub fn record_key(id: &JobId) -> String {
    format!("{}{}", RECORD_PREFIX, id)
}

pub fn artifact_key(id: &JobId) -> String {
    format!("{}{}", ARTIFACT_PREFIX, id)
}

/// Errors raised by a shared store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key {0} holds the wrong kind of value")]
    WrongType(String),

    #[error("failed to encode or decode {key}: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// String key/value store with expiry and FIFO lists
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Stores a string, replacing any previous value; `ttl` of `None` never expires
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Reads a string; expired keys read as absent
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deletes a key; deleting a missing key succeeds
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Lists keys starting with `prefix`, including expired ones not yet deleted
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remaining time-to-live
    ///
    /// `None` when the key is missing or never expires; zero once expired.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Pushes onto the head of a list, returning its new length
    async fn lpush(&self, key: &str, value: String) -> Result<usize, StoreError>;

    /// Pushes onto the head of a list only while it holds fewer than `max`
    /// elements, checking and pushing as one atomic step
    ///
    /// Returns the new length, or `None` when the list is full.
    async fn lpush_capped(
        &self,
        key: &str,
        value: String,
        max: usize,
    ) -> Result<Option<usize>, StoreError>;

    /// Pops from the tail of a list, waiting up to `timeout` for an element
    ///
    /// Must be cancel-safe: dropping the future never loses an element.
    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

    /// Length of a list; missing lists are empty
    async fn llen(&self, key: &str) -> Result<usize, StoreError>;
}

/// Reads and decodes a JSON value
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn SharedStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Codec {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encodes and stores a JSON value
pub async fn set_json<T: serde::Serialize + Sync>(
    store: &dyn SharedStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })?;
    store.set(key, raw, ttl).await
}

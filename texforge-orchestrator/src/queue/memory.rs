//! In-memory shared store
//!
//! A single-process [`SharedStore`]. Expired keys read as absent but stay
//! listable, with zero remaining time-to-live, until someone deletes them;
//! this is what lets the sweeper observe expiries.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::store::{SharedStore, StoreError};

#[derive(Debug)]
enum Value {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory implementation of SharedStore
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    pushed: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, key: &str, value: String, max: usize) -> Result<Option<usize>, StoreError> {
        let len = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::List(VecDeque::new()),
                expires_at: None,
            });
            let Value::List(list) = &mut entry.value else {
                return Err(StoreError::WrongType(key.to_string()));
            };
            if list.len() >= max {
                if list.is_empty() {
                    entries.remove(key);
                }
                return Ok(None);
            }
            list.push_front(value);
            list.len()
        };
        self.pushed.notify_waiters();
        Ok(Some(len))
    }

    fn try_pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        let Value::List(list) = &mut entry.value else {
            return Err(StoreError::WrongType(key.to_string()));
        };
        let popped = list.pop_back();
        if list.is_empty() {
            entries.remove(key);
        }
        Ok(popped)
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = Entry {
            value: Value::Text(value),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock();
        match entries.get(key) {
            None => Ok(None),
            Some(entry) if entry.is_expired(Instant::now()) => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn lpush(&self, key: &str, value: String) -> Result<usize, StoreError> {
        let len = self.push(key, value, usize::MAX)?;
        Ok(len.unwrap_or_default())
    }

    async fn lpush_capped(
        &self,
        key: &str,
        value: String,
        max: usize,
    ) -> Result<Option<usize>, StoreError> {
        self.push(key, value, max)
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a push in between is not missed
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_pop(key)? {
                return Ok(Some(value));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        match self.entries.lock().get(key) {
            None => Ok(0),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.len()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_expired_keys_read_as_absent_but_stay_listed() {
        let store = MemoryStore::new();
        store
            .set("pdf:a", "a".into(), Some(Duration::from_secs(180)))
            .await
            .unwrap();
        store.set("pdf:b", "b".into(), None).await.unwrap();

        assert_eq!(store.get("pdf:a").await.unwrap().as_deref(), Some("a"));
        assert_eq!(
            store.ttl("pdf:a").await.unwrap(),
            Some(Duration::from_secs(180))
        );
        assert_eq!(store.ttl("pdf:b").await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(181)).await;

        assert_eq!(store.get("pdf:a").await.unwrap(), None);
        assert_eq!(store.ttl("pdf:a").await.unwrap(), Some(Duration::ZERO));
        assert_eq!(store.keys("pdf:").await.unwrap(), vec!["pdf:a", "pdf:b"]);

        store.del("pdf:a").await.unwrap();
        store.del("pdf:a").await.unwrap();
        assert_eq!(store.keys("pdf:").await.unwrap(), vec!["pdf:b"]);
        assert_eq!(store.ttl("pdf:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_is_fifo() {
        let store = MemoryStore::new();
        assert_eq!(store.lpush("queue", "1".into()).await.unwrap(), 1);
        assert_eq!(store.lpush("queue", "2".into()).await.unwrap(), 2);
        assert_eq!(store.llen("queue").await.unwrap(), 2);

        let pop = || store.brpop("queue", Duration::from_millis(10));
        assert_eq!(pop().await.unwrap().as_deref(), Some("1"));
        assert_eq!(pop().await.unwrap().as_deref(), Some("2"));
        assert_eq!(pop().await.unwrap(), None);
        assert_eq!(store.llen("queue").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blocking_pop_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let popper = {
            let store = store.clone();
            tokio::spawn(async move { store.brpop("queue", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.lpush("queue", "job".into()).await.unwrap();

        assert_eq!(popper.await.unwrap().unwrap().as_deref(), Some("job"));
    }

    #[tokio::test]
    async fn test_capped_push_stops_at_limit() {
        let store = MemoryStore::new();
        assert_eq!(store.lpush_capped("queue", "1".into(), 2).await.unwrap(), Some(1));
        assert_eq!(store.lpush_capped("queue", "2".into(), 2).await.unwrap(), Some(2));
        assert_eq!(store.lpush_capped("queue", "3".into(), 2).await.unwrap(), None);
        assert_eq!(store.llen("queue").await.unwrap(), 2);

        store.brpop("queue", Duration::from_millis(10)).await.unwrap();
        assert_eq!(store.lpush_capped("queue", "3".into(), 2).await.unwrap(), Some(2));

        assert_eq!(store.lpush_capped("empty", "x".into(), 0).await.unwrap(), None);
        assert!(store.keys("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.set("queue", "text".into(), None).await.unwrap();
        assert!(matches!(
            store.lpush("queue", "x".into()).await,
            Err(StoreError::WrongType(_))
        ));
        assert!(store.llen("queue").await.is_err());
    }
}

//! Redis-backed shared store
//!
//! Lets the front door, the worker and the sweeper run as separate processes
//! and keeps queued work across restarts. Redis drops expired keys on its
//! own, so every key written with a time-to-live is also indexed by deadline
//! in a sorted set. `keys` and `ttl` consult that index, which keeps an
//! expired key listable with zero time-to-live until `del` removes it.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::error;

use super::store::{SharedStore, StoreError};

/// Sorted set of keys written with a time-to-live, scored by deadline in
/// milliseconds since the epoch
const EXPIRY_INDEX: &str = "texforge:expiry";

/// Keys fetched per SCAN round trip
const SCAN_BATCH: usize = 100;

/// Shortest blocking pop; BRPOP reads a zero timeout as "wait forever"
const MIN_POP_TIMEOUT: Duration = Duration::from_millis(10);

const CAPPED_PUSH: &str = r"
if redis.call('LLEN', KEYS[1]) >= tonumber(ARGV[2]) then
    return -1
end
return redis.call('LPUSH', KEYS[1], ARGV[1])
";

/// SharedStore on a Redis server
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    /// Blocking pops park the connection, so they get their own
    blocking: ConnectionManager,
    capped_push: Script,
}

impl RedisStore {
    /// Connects to the server at `url`, e.g. `redis://cache:6379/0`
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(unavailable)?;
        let blocking = ConnectionManager::new(client).await.map_err(unavailable)?;

        Ok(Self {
            conn,
            blocking,
            capped_push: Script::new(CAPPED_PUSH),
        })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        match ttl {
            Some(ttl) => {
                let millis = ttl_millis(ttl);
                pipe.cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(millis)
                    .ignore()
                    .cmd("ZADD")
                    .arg(EXPIRY_INDEX)
                    .arg(now_millis().saturating_add(millis))
                    .arg(key)
                    .ignore();
            }
            None => {
                pipe.cmd("SET")
                    .arg(key)
                    .arg(value)
                    .ignore()
                    .cmd("ZREM")
                    .arg(EXPIRY_INDEX)
                    .arg(key)
                    .ignore();
            }
        }

        pipe.query_async::<()>(&mut self.conn.clone())
            .await
            .map_err(|e| store_error(key, e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| store_error(key, e))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(key)
            .ignore()
            .cmd("ZREM")
            .arg(EXPIRY_INDEX)
            .arg(key)
            .ignore()
            .query_async::<()>(&mut self.conn.clone())
            .await
            .map_err(|e| store_error(key, e))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        // Prefixes are plain constants, free of glob characters
        let pattern = format!("{}*", prefix);

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        let indexed: Vec<String> = redis::cmd("ZRANGE")
            .arg(EXPIRY_INDEX)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        keys.extend(indexed.into_iter().filter(|key| key.starts_with(prefix)));

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let deadline: Option<f64> = redis::cmd("ZSCORE")
            .arg(EXPIRY_INDEX)
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error(key, e))?;
        if let Some(deadline) = deadline {
            return Ok(Some(remaining(deadline as i64, now_millis())));
        }

        let reply: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error(key, e))?;
        Ok(pttl_to_ttl(reply))
    }

    async fn lpush(&self, key: &str, value: String) -> Result<usize, StoreError> {
        redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| store_error(key, e))
    }

    async fn lpush_capped(
        &self,
        key: &str,
        value: String,
        max: usize,
    ) -> Result<Option<usize>, StoreError> {
        let reply: i64 = self
            .capped_push
            .key(key)
            .arg(value)
            .arg(max)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| store_error(key, e))?;
        Ok(usize::try_from(reply).ok())
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut blocking = self.blocking.clone();
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let timeout = timeout.max(MIN_POP_TIMEOUT).as_secs_f64();
        let (tx, rx) = oneshot::channel();

        // The pop runs detached so that a caller dropping this future cannot
        // lose an element already taken off the list
        tokio::spawn(async move {
            let popped = redis::cmd("BRPOP")
                .arg(&key)
                .arg(timeout)
                .query_async::<Option<(String, String)>>(&mut blocking)
                .await
                .map(|reply| reply.map(|(_, value)| value))
                .map_err(|e| store_error(&key, e));

            // Nobody is waiting any more: return the element to the tail it
            // was popped from
            if let Err(Ok(Some(value))) = tx.send(popped) {
                let pushed = redis::cmd("RPUSH")
                    .arg(&key)
                    .arg(&value)
                    .query_async::<usize>(&mut conn)
                    .await;
                if let Err(e) = pushed {
                    error!("Lost queue entry {} while returning it to {}: {}", value, key, e);
                }
            }
        });

        rx.await
            .map_err(|_| StoreError::Unavailable("blocking pop was aborted".to_string()))?
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| store_error(key, e))
    }
}

fn unavailable(err: RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn store_error(key: &str, err: RedisError) -> StoreError {
    if err.code() == Some("WRONGTYPE") {
        StoreError::WrongType(key.to_string())
    } else {
        unavailable(err)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// PX takes whole milliseconds and rejects zero
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

fn remaining(deadline: i64, now: i64) -> Duration {
    u64::try_from(deadline.saturating_sub(now))
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO)
}

/// Maps a PTTL reply: -2 (missing) and -1 (no expiry) both read as `None`
fn pttl_to_ttl(reply: i64) -> Option<Duration> {
    u64::try_from(reply).ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_time_floors_at_zero() {
        assert_eq!(remaining(10_500, 10_000), Duration::from_millis(500));
        assert_eq!(remaining(10_000, 10_000), Duration::ZERO);
        assert_eq!(remaining(9_000, 10_000), Duration::ZERO);
    }

    #[test]
    fn test_pttl_replies() {
        assert_eq!(pttl_to_ttl(-2), None);
        assert_eq!(pttl_to_ttl(-1), None);
        assert_eq!(pttl_to_ttl(0), Some(Duration::ZERO));
        assert_eq!(pttl_to_ttl(180_000), Some(Duration::from_secs(180)));
    }

    #[test]
    fn test_ttl_millis_is_never_zero() {
        assert_eq!(ttl_millis(Duration::from_secs(180)), 180_000);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::MAX), i64::MAX);
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let err = RedisStore::connect("not a redis url").await.err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_expiry_index_is_outside_job_prefixes() {
        use crate::queue::store::{ARTIFACT_PREFIX, QUEUE_KEY, RECORD_PREFIX};
        assert!(!EXPIRY_INDEX.starts_with(RECORD_PREFIX));
        assert!(!EXPIRY_INDEX.starts_with(ARTIFACT_PREFIX));
        assert_ne!(EXPIRY_INDEX, QUEUE_KEY);
    }
}

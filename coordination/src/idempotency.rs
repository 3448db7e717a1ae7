//! Idempotency Store (SPEC_FULL.md §4.2): a two-phase cache keyed by
//! `(userId, idempotencyKey)` that lets a client safely retry a request
//! across network timeouts without two replicas executing the same logical
//! request concurrently.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const PROCESSING_MARKER: &str = r#"{"status":"processing"}"#;
const POLL_ATTEMPTS: u32 = 15;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// A final response was already cached; serve it without re-running the action.
    Hit(Value),
    /// Another writer has claimed the key and is still working; the caller should poll.
    Pending,
    /// The caller is the first writer and must perform the work, then call `store`.
    FirstWriter,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn claim(&self, cache_key: &str, ttl_ms: i64) -> anyhow::Result<ClaimOutcome>;

    async fn get(&self, cache_key: &str) -> anyhow::Result<Option<Value>>;

    async fn store(&self, cache_key: &str, response: &Value, ttl_ms: i64) -> anyhow::Result<()>;

    /// Deletes the processing marker so a later retry may attempt the work
    /// afresh. Called by the claimant on failure.
    async fn forget(&self, cache_key: &str) -> anyhow::Result<()>;

    /// Polls `get` up to 15 times at 100ms intervals (≤1.5s total), per
    /// SPEC_FULL.md §4.2. Returns the final response once it appears, or
    /// `None` if the polling budget is exhausted while still processing.
    async fn poll_until_ready(&self, cache_key: &str) -> anyhow::Result<Option<Value>> {
        for attempt in 0..POLL_ATTEMPTS {
            if let Some(resp) = self.get(cache_key).await? {
                if !is_processing_marker(&resp) {
                    return Ok(Some(resp));
                }
            }
            debug!(attempt, cache_key, "idempotency poll: still processing");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(None)
    }
}

fn is_processing_marker(v: &Value) -> bool {
    v.get("status").and_then(Value::as_str) == Some("processing")
}

#[derive(Clone)]
pub struct RedisIdempotencyStore {
    conn: ConnectionManager,
}

impl RedisIdempotencyStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    #[instrument(skip(self), fields(cache_key = %cache_key, ttl_ms))]
    async fn claim(&self, cache_key: &str, ttl_ms: i64) -> anyhow::Result<ClaimOutcome> {
        let mut conn = self.conn.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(cache_key)
            .arg(PROCESSING_MARKER)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        if set.as_deref() == Some("OK") {
            debug!("idempotency claim: first writer");
            return Ok(ClaimOutcome::FirstWriter);
        }

        match self.get(cache_key).await? {
            Some(v) if is_processing_marker(&v) => Ok(ClaimOutcome::Pending),
            Some(v) => Ok(ClaimOutcome::Hit(v)),
            // The marker expired between the failed SET and this GET; treat
            // the caller as the first writer rather than erroring out.
            None => Ok(ClaimOutcome::FirstWriter),
        }
    }

    async fn get(&self, cache_key: &str) -> anyhow::Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(cache_key).await?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, response), fields(cache_key = %cache_key, ttl_ms))]
    async fn store(&self, cache_key: &str, response: &Value, ttl_ms: i64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(response)?;
        let _: () = conn.set_ex(cache_key, body, (ttl_ms / 1000).max(1) as u64).await?;
        Ok(())
    }

    async fn forget(&self, cache_key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(cache_key).await?;
        Ok(())
    }
}

/// In-memory fake for unit tests, mirroring `MockLockStore`.
pub mod mock {
    use super::{ClaimOutcome, IdempotencyStore, is_processing_marker};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    struct Entry {
        value: Value,
        expires_at_ms: i64,
    }

    pub struct MockIdempotencyStore {
        entries: Mutex<HashMap<String, Entry>>,
        now_ms: Mutex<i64>,
    }

    impl MockIdempotencyStore {
        pub fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                now_ms: Mutex::new(0),
            }
        }

        pub fn advance(&self, delta_ms: i64) {
            *self.now_ms.lock() += delta_ms;
        }

        fn now(&self) -> i64 {
            *self.now_ms.lock()
        }

        fn evict_expired(&self, entries: &mut HashMap<String, Entry>) {
            let now = self.now();
            entries.retain(|_, e| e.expires_at_ms > now);
        }
    }

    impl Default for MockIdempotencyStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl IdempotencyStore for MockIdempotencyStore {
        async fn claim(&self, cache_key: &str, ttl_ms: i64) -> anyhow::Result<ClaimOutcome> {
            let mut entries = self.entries.lock();
            self.evict_expired(&mut entries);

            if let Some(e) = entries.get(cache_key) {
                return Ok(if is_processing_marker(&e.value) {
                    ClaimOutcome::Pending
                } else {
                    ClaimOutcome::Hit(e.value.clone())
                });
            }

            entries.insert(
                cache_key.to_string(),
                Entry {
                    value: json!({"status": "processing"}),
                    expires_at_ms: self.now() + ttl_ms,
                },
            );
            Ok(ClaimOutcome::FirstWriter)
        }

        async fn get(&self, cache_key: &str) -> anyhow::Result<Option<Value>> {
            let mut entries = self.entries.lock();
            self.evict_expired(&mut entries);
            Ok(entries.get(cache_key).map(|e| e.value.clone()))
        }

        async fn store(&self, cache_key: &str, response: &Value, ttl_ms: i64) -> anyhow::Result<()> {
            let mut entries = self.entries.lock();
            entries.insert(
                cache_key.to_string(),
                Entry {
                    value: response.clone(),
                    expires_at_ms: self.now() + ttl_ms,
                },
            );
            Ok(())
        }

        async fn forget(&self, cache_key: &str) -> anyhow::Result<()> {
            self.entries.lock().remove(cache_key);
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[tokio::test]
        async fn first_writer_then_hit_after_store() {
            let store = MockIdempotencyStore::new();
            let outcome = store.claim("idem:u1:k1", 60_000).await.unwrap();
            assert!(matches!(outcome, ClaimOutcome::FirstWriter));

            let resp = json!({"reservationIds": ["r1"]});
            store.store("idem:u1:k1", &resp, 60_000).await.unwrap();

            let outcome = store.claim("idem:u1:k1", 60_000).await.unwrap();
            match outcome {
                ClaimOutcome::Hit(v) => assert_eq!(v, resp),
                other => panic!("expected Hit, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn second_claim_before_store_is_pending() {
            let store = MockIdempotencyStore::new();
            store.claim("idem:u1:k1", 60_000).await.unwrap();
            let outcome = store.claim("idem:u1:k1", 60_000).await.unwrap();
            assert!(matches!(outcome, ClaimOutcome::Pending));
        }

        #[tokio::test]
        async fn forget_allows_fresh_claim() {
            let store = MockIdempotencyStore::new();
            store.claim("idem:u1:k1", 60_000).await.unwrap();
            store.forget("idem:u1:k1").await.unwrap();

            let outcome = store.claim("idem:u1:k1", 60_000).await.unwrap();
            assert!(matches!(outcome, ClaimOutcome::FirstWriter));
        }

        #[tokio::test]
        async fn marker_expires_after_ttl() {
            let store = MockIdempotencyStore::new();
            store.claim("idem:u1:k1", 1_000).await.unwrap();
            store.advance(1_001);

            let outcome = store.claim("idem:u1:k1", 1_000).await.unwrap();
            assert!(matches!(outcome, ClaimOutcome::FirstWriter));
        }

        #[tokio::test]
        async fn poll_until_ready_observes_eventual_store() {
            use std::sync::Arc;

            let store = Arc::new(MockIdempotencyStore::new());
            store.claim("idem:u1:k1", 60_000).await.unwrap();

            let writer = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                writer
                    .store("idem:u1:k1", &json!({"ok": true}), 60_000)
                    .await
                    .unwrap();
            });

            let resp = store.poll_until_ready("idem:u1:k1").await.unwrap();
            assert_eq!(resp, Some(json!({"ok": true})));
        }
    }
}

pub use mock::MockIdempotencyStore;

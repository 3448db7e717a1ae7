//! Lock Service (SPEC_FULL.md §4.1): atomic ownership over short-lived keys
//! in the coordination store. The database remains the source of truth on
//! contention; callers must tolerate a lock disappearing underneath them.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, instrument, warn};

/// Compare-and-delete: only removes `KEYS[1]` if its value still equals
/// `ARGV[1]`. Runs as a single Redis script so the check-then-delete can't
/// race a concurrent `acquire` by a different owner.
const RELEASE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
";

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomic set-if-absent with a millisecond TTL. Returns `true` iff the
    /// caller now owns `key`.
    async fn acquire(&self, key: &str, owner: &str, ttl_ms: i64) -> anyhow::Result<bool>;

    /// Releases `key` only if it is currently owned by `owner`.
    async fn release(&self, key: &str, owner: &str) -> anyhow::Result<()>;

    /// Unconditional delete of a batch of keys (best-effort reclaim path).
    async fn release_all(&self, keys: &[String]) -> anyhow::Result<()>;

    /// Batched read preserving index order; `None` where the key is absent.
    async fn get_many(&self, keys: &[String]) -> anyhow::Result<Vec<Option<String>>>;
}

/// Redis-backed implementation using a multiplexed, auto-reconnecting
/// connection manager so callers never have to pool connections themselves.
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
}

impl RedisLockStore {
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
impl LockStore for RedisLockStore {
    #[instrument(skip(self), fields(key = %key, owner = %owner, ttl_ms))]
    async fn acquire(&self, key: &str, owner: &str, ttl_ms: i64) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        let acquired = result.as_deref() == Some("OK");
        debug!(acquired, "lock acquire attempt");
        Ok(acquired)
    }

    #[instrument(skip(self), fields(key = %key, owner = %owner))]
    async fn release(&self, key: &str, owner: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(RELEASE_SCRIPT);
        let deleted: i64 = script.key(key).arg(owner).invoke_async(&mut conn).await?;

        if deleted == 0 {
            warn!("release no-op: key absent or owned by another writer");
        }
        Ok(())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn release_all(&self, keys: &[String]) -> anyhow::Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn get_many(&self, keys: &[String]) -> anyhow::Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        // MGET on a single key returns a bare value rather than an array in
        // some redis-rs versions; route single-key reads through GET so the
        // return type stays a Vec regardless of batch size.
        if keys.len() == 1 {
            let v: Option<String> = conn.get(&keys[0]).await?;
            return Ok(vec![v]);
        }
        let values: Vec<Option<String>> = conn.mget(keys).await?;
        Ok(values)
    }
}

/// In-memory fake used by unit and property tests (teacher idiom: see
/// `MockSessionRepository` in `backend/src/session/store.rs`). TTLs are
/// tracked with a monotonic logical clock supplied by the test instead of
/// wall-clock time, so tests can deterministically simulate expiry.
pub mod mock {
    use super::LockStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct Entry {
        owner: String,
        expires_at_ms: i64,
    }

    pub struct MockLockStore {
        entries: Mutex<HashMap<String, Entry>>,
        now_ms: Mutex<i64>,
    }

    impl MockLockStore {
        pub fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                now_ms: Mutex::new(0),
            }
        }

        /// Advances the fake clock, treating this as wall-clock-equivalent
        /// time for TTL expiry checks.
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

    impl Default for MockLockStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl LockStore for MockLockStore {
        async fn acquire(&self, key: &str, owner: &str, ttl_ms: i64) -> anyhow::Result<bool> {
            let mut entries = self.entries.lock();
            self.evict_expired(&mut entries);

            if entries.contains_key(key) {
                return Ok(false);
            }

            entries.insert(
                key.to_string(),
                Entry {
                    owner: owner.to_string(),
                    expires_at_ms: self.now() + ttl_ms,
                },
            );
            Ok(true)
        }

        async fn release(&self, key: &str, owner: &str) -> anyhow::Result<()> {
            let mut entries = self.entries.lock();
            if let Some(e) = entries.get(key) {
                if e.owner == owner {
                    entries.remove(key);
                }
            }
            Ok(())
        }

        async fn release_all(&self, keys: &[String]) -> anyhow::Result<()> {
            let mut entries = self.entries.lock();
            for k in keys {
                entries.remove(k);
            }
            Ok(())
        }

        async fn get_many(&self, keys: &[String]) -> anyhow::Result<Vec<Option<String>>> {
            let mut entries = self.entries.lock();
            self.evict_expired(&mut entries);
            Ok(keys.iter().map(|k| entries.get(k).map(|e| e.owner.clone())).collect())
        }
    }

}

pub use mock::MockLockStore;

pub mod idempotency;
pub mod keys;
pub mod lock;

pub use idempotency::{ClaimOutcome, IdempotencyStore, MockIdempotencyStore, RedisIdempotencyStore};
pub use lock::{LockStore, MockLockStore, RedisLockStore};

//! Key-value store contract.
//!
//! The protocol never holds client-side locks; all of its safety comes from
//! single store commands and the atomic [`StoreScript`]s. `InMemoryBackend`
//! is for tests/dev, `RedisBackend` (feature `redis`) for deployments.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod scripts;

pub use in_memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use scripts::StoreScript;

use crate::error::StoreResult;

/// Operations the protocol needs from the store.
///
/// Absent keys read as empty (lists, sets) or `None` (strings, scores), the
/// way Redis reports them.
pub trait Backend: Send + Sync {
    /// Read a string value.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a string value, replacing any value and expiry.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Create-if-absent. Returns whether the value was written.
    fn set_nx(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Update-only: writes only if the key already exists.
    fn set_xx(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Delete a key of any type. Returns whether it existed.
    fn del(&self, key: &str) -> StoreResult<bool>;

    /// Whether the key exists.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Set a time-to-live. Returns false if the key does not exist.
    fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool>;

    /// Remaining time-to-live; `None` for missing or persistent keys.
    fn ttl(&self, key: &str) -> StoreResult<Option<u64>>;

    /// Rename unless `to` already exists. Fails if `from` is missing.
    fn rename_nx(&self, from: &str, to: &str) -> StoreResult<bool>;

    /// Push onto the head of a list. Returns the new length.
    fn lpush(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Push onto the tail of a list. Returns the new length.
    fn rpush(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Push only if the list exists; 0 means it did not.
    fn rpush_x(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// List length; 0 for a missing key.
    fn llen(&self, key: &str) -> StoreResult<u64>;

    /// Remove every occurrence of `value`.
    fn lrem(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// The whole list, head first.
    fn lrange(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Add a set member. Returns whether it was new.
    fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Remove a set member. Returns whether it was present.
    fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// All set members, in no particular order.
    fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Add or rescore a sorted-set member. Returns whether it was new.
    fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<bool>;

    /// Remove a sorted-set member. Returns whether it was present.
    fn zrem(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Score of a sorted-set member.
    fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    /// Run `script` atomically. `None` is the script's nil/false reply.
    fn eval(&self, script: StoreScript, keys: &[String], args: &[String]) -> StoreResult<Option<i64>>;
}

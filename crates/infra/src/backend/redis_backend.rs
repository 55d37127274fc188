//! Redis-backed store (feature `redis`).
//!
//! One connection per backend, opened on first use and dropped after an
//! I/O failure so the next call reconnects. Failed calls are not retried
//! here; the error goes back to the caller.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use super::{Backend, StoreScript};
use crate::error::{StoreError, StoreResult};

pub struct RedisBackend {
    client: redis::Client,
    connection: Mutex<Option<redis::Connection>>,
    scripts: HashMap<StoreScript, redis::Script>,
}

impl RedisBackend {
    /// Create a backend for `redis_url` (e.g. `redis://localhost:6379`).
    ///
    /// Only the URL is validated here; the connection is opened lazily.
    pub fn open(redis_url: impl AsRef<str>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let scripts = StoreScript::ALL
            .iter()
            .map(|script| (*script, redis::Script::new(script.lua())))
            .collect();

        Ok(Self {
            client,
            connection: Mutex::new(None),
            scripts,
        })
    }

    /// Open the connection now instead of on first use.
    pub fn connect(redis_url: impl AsRef<str>) -> StoreResult<Self> {
        let backend = Self::open(redis_url)?;
        backend.with_connection(|conn| redis::cmd("PING").query::<String>(conn))?;
        Ok(backend)
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);

        if guard.is_none() {
            let conn = self
                .client
                .get_connection()
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            *guard = Some(conn);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Connection("no connection available".to_string()));
        };

        op(conn).map_err(|e| {
            if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
                warn!(error = %e, "Dropping redis connection after failure");
                *guard = None;
                StoreError::Connection(e.to_string())
            } else {
                StoreError::Command(e.to_string())
            }
        })
    }
}

impl Backend for RedisBackend {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_connection(|conn| redis::cmd("GET").arg(key).query(conn))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_connection(|conn| redis::cmd("SET").arg(key).arg(value).query(conn))
    }

    fn set_nx(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.with_connection(|conn| redis::cmd("SETNX").arg(key).arg(value).query(conn))
    }

    fn set_xx(&self, key: &str, value: &str) -> StoreResult<bool> {
        let reply: Option<String> = self.with_connection(|conn| {
            redis::cmd("SET").arg(key).arg(value).arg("XX").query(conn)
        })?;
        Ok(reply.is_some())
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        let removed: u64 = self.with_connection(|conn| redis::cmd("DEL").arg(key).query(conn))?;
        Ok(removed > 0)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.with_connection(|conn| redis::cmd("EXISTS").arg(key).query(conn))
    }

    fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        self.with_connection(|conn| redis::cmd("EXPIRE").arg(key).arg(seconds).query(conn))
    }

    fn ttl(&self, key: &str) -> StoreResult<Option<u64>> {
        // -2: no such key, -1: no expiry.
        let ttl: i64 = self.with_connection(|conn| redis::cmd("TTL").arg(key).query(conn))?;
        Ok(u64::try_from(ttl).ok())
    }

    fn rename_nx(&self, from: &str, to: &str) -> StoreResult<bool> {
        self.with_connection(|conn| redis::cmd("RENAMENX").arg(from).arg(to).query(conn))
    }

    fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.with_connection(|conn| redis::cmd("LPUSH").arg(key).arg(value).query(conn))
    }

    fn rpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.with_connection(|conn| redis::cmd("RPUSH").arg(key).arg(value).query(conn))
    }

    fn rpush_x(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.with_connection(|conn| redis::cmd("RPUSHX").arg(key).arg(value).query(conn))
    }

    fn llen(&self, key: &str) -> StoreResult<u64> {
        self.with_connection(|conn| redis::cmd("LLEN").arg(key).query(conn))
    }

    fn lrem(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.with_connection(|conn| redis::cmd("LREM").arg(key).arg(0).arg(value).query(conn))
    }

    fn lrange(&self, key: &str) -> StoreResult<Vec<String>> {
        self.with_connection(|conn| redis::cmd("LRANGE").arg(key).arg(0).arg(-1).query(conn))
    }

    fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.with_connection(|conn| redis::cmd("SADD").arg(key).arg(member).query(conn))
    }

    fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.with_connection(|conn| redis::cmd("SREM").arg(key).arg(member).query(conn))
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.with_connection(|conn| redis::cmd("SMEMBERS").arg(key).query(conn))
    }

    fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<bool> {
        self.with_connection(|conn| {
            redis::cmd("ZADD").arg(key).arg(score).arg(member).query(conn)
        })
    }

    fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.with_connection(|conn| redis::cmd("ZREM").arg(key).arg(member).query(conn))
    }

    fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        self.with_connection(|conn| redis::cmd("ZSCORE").arg(key).arg(member).query(conn))
    }

    fn eval(&self, script: StoreScript, keys: &[String], args: &[String]) -> StoreResult<Option<i64>> {
        script.check_arity(keys, args)?;
        let Some(compiled) = self.scripts.get(&script) else {
            return Err(StoreError::Command(format!("script {} is not loaded", script.name())));
        };

        let mut invocation = compiled.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        self.with_connection(|conn| invocation.invoke(conn))
    }
}

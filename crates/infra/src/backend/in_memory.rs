use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Backend, StoreScript};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
    ZSet(BTreeMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Command(format!(
        "WRONGTYPE operation against key `{key}` holding the wrong kind of value"
    ))
}

/// Redis-like keyspace. Expired keys are dropped lazily on access; empty
/// collections are deleted, as Redis does.
#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    fn purge(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.entries.remove(key);
        }
    }

    fn entry(&mut self, key: &str) -> Option<&mut Entry> {
        self.purge(key);
        self.entries.get_mut(key)
    }

    fn exists(&mut self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    fn del(&mut self, key: &str) -> bool {
        self.purge(key);
        self.entries.remove(key).is_some()
    }

    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.entries.get(key).map(|entry| &entry.value) {
            Some(Value::List(list)) => list.is_empty(),
            Some(Value::Set(set)) => set.is_empty(),
            Some(Value::ZSet(zset)) => zset.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
        }
    }

    fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry { value: Value::Str(value), .. }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
    }

    fn set_nx(&mut self, key: &str, value: &str) -> bool {
        if self.exists(key) {
            return false;
        }
        self.set(key, value);
        true
    }

    fn set_xx(&mut self, key: &str, value: &str) -> bool {
        if !self.exists(key) {
            return false;
        }
        self.set(key, value);
        true
    }

    fn expire(&mut self, key: &str, seconds: u64) -> bool {
        if seconds == 0 {
            return self.del(key);
        }
        match self.entry(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                true
            }
            None => false,
        }
    }

    fn persist(&mut self, key: &str) -> bool {
        match self.entry(key) {
            Some(entry) => entry.expires_at.take().is_some(),
            None => false,
        }
    }

    fn ttl(&mut self, key: &str) -> Option<u64> {
        let expires_at = self.entry(key)?.expires_at?;
        let remaining = expires_at.saturating_duration_since(Instant::now());
        Some(((remaining.as_millis() + 500) / 1000) as u64)
    }

    fn rename_nx(&mut self, from: &str, to: &str) -> StoreResult<bool> {
        if !self.exists(from) {
            return Err(StoreError::Command("ERR no such key".to_string()));
        }
        if self.exists(to) {
            return Ok(false);
        }
        if let Some(entry) = self.entries.remove(from) {
            self.entries.insert(to.to_string(), entry);
        }
        Ok(true)
    }

    fn list(&mut self, key: &str) -> StoreResult<Option<&mut VecDeque<String>>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry { value: Value::List(list), .. }) => Ok(Some(list)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn list_or_create(&mut self, key: &str) -> StoreResult<&mut VecDeque<String>> {
        self.purge(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        match &mut entry.value {
            Value::List(list) => Ok(list),
            _ => Err(wrong_type(key)),
        }
    }

    fn lpush(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        let list = self.list_or_create(key)?;
        list.push_front(value.to_string());
        Ok(list.len() as u64)
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        let list = self.list_or_create(key)?;
        list.push_back(value.to_string());
        Ok(list.len() as u64)
    }

    fn rpush_x(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        match self.list(key)? {
            Some(list) => {
                list.push_back(value.to_string());
                Ok(list.len() as u64)
            }
            None => Ok(0),
        }
    }

    fn llen(&mut self, key: &str) -> StoreResult<u64> {
        Ok(self.list(key)?.map_or(0, |list| list.len() as u64))
    }

    fn lrem(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        let removed = match self.list(key)? {
            Some(list) => {
                let before = list.len();
                list.retain(|item| item != value);
                (before - list.len()) as u64
            }
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    fn lrange(&mut self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .list(key)?
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn set_members(&mut self, key: &str) -> StoreResult<Option<&mut BTreeSet<String>>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry { value: Value::Set(set), .. }) => Ok(Some(set)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        self.purge(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Set(BTreeSet::new())));
        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(wrong_type(key)),
        }
    }

    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        let removed = self
            .set_members(key)?
            .is_some_and(|set| set.remove(member));
        self.drop_if_empty(key);
        Ok(removed)
    }

    fn smembers(&mut self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .set_members(key)?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn zset(&mut self, key: &str) -> StoreResult<Option<&mut BTreeMap<String, f64>>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry { value: Value::ZSet(zset), .. }) => Ok(Some(zset)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn zadd(&mut self, key: &str, member: &str, score: f64) -> StoreResult<bool> {
        self.purge(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::ZSet(BTreeMap::new())));
        match &mut entry.value {
            Value::ZSet(zset) => Ok(zset.insert(member.to_string(), score).is_none()),
            _ => Err(wrong_type(key)),
        }
    }

    fn zrem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        let removed = self
            .zset(key)?
            .is_some_and(|zset| zset.remove(member).is_some());
        self.drop_if_empty(key);
        Ok(removed)
    }

    fn zscore(&mut self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        Ok(self.zset(key)?.and_then(|zset| zset.get(member).copied()))
    }

    /// Native rendition of each Lua body in `scripts.rs`.
    fn run_script(&mut self, script: StoreScript, keys: &[String], args: &[String]) -> StoreResult<Option<i64>> {
        script.check_arity(keys, args)?;

        match script {
            StoreScript::EnqueueUnassigned => {
                self.sadd(&keys[0], &args[0])?;
                Ok(Some(self.lpush(&keys[1], &args[1])? as i64))
            }
            StoreScript::ScheduleDelayed => {
                let length = self.rpush(&keys[0], &args[0])?;
                self.zadd(&keys[1], &args[1], parse_score(&args[1])?)?;
                Ok(Some(length as i64))
            }
            StoreScript::InitializeBatch => {
                if self.exists(&keys[0]) {
                    return Ok(None);
                }
                Ok(Some(self.lpush(&keys[0], &args[0])? as i64))
            }
            StoreScript::CommitBatch => {
                // pcall: a missing source key is a failed rename, not an error.
                if !self.rename_nx(&keys[2], &keys[1]).unwrap_or(false) {
                    return Ok(None);
                }
                self.persist(&keys[1]);
                Ok(Some(self.lpush(&keys[0], &args[0])? as i64))
            }
            StoreScript::DeferUnique => {
                if self.get(&keys[0])?.as_deref() != Some(args[0].as_str()) {
                    return Ok(None);
                }
                Ok(self.set_nx(&keys[1], &args[1]).then_some(1))
            }
            StoreScript::ReleaseUnique => {
                if self.get(&keys[0])?.as_deref() != Some(args[0].as_str()) {
                    return Ok(None);
                }
                Ok(Some(i64::from(self.del(&keys[0]))))
            }
            StoreScript::InsertPlan => {
                if !self.set_nx(&keys[0], &args[0]) {
                    return Ok(None);
                }
                self.zadd(&keys[1], &args[1], parse_score(&args[1])?)?;
                self.rpush(&keys[2], &args[2])?;
                self.sadd(&keys[3], &args[2])?;
                Ok(Some(1))
            }
            StoreScript::CleanPlanTimestamp => {
                if self.llen(&keys[1])? != 0 {
                    return Ok(None);
                }
                self.del(&keys[1]);
                self.zrem(&keys[0], &args[0])?;
                Ok(Some(1))
            }
        }
    }
}

fn parse_score(raw: &str) -> StoreResult<f64> {
    raw.parse()
        .map_err(|_| StoreError::Command(format!("ERR value `{raw}` is not a valid float")))
}

/// In-process store with Redis semantics.
///
/// Intended for tests/dev. Every call, scripts included, runs under a single
/// lock, which gives scripts the same all-or-nothing visibility they have in
/// Redis.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    keyspace: Mutex<Keyspace>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn keyspace(&self) -> MutexGuard<'_, Keyspace> {
        self.keyspace.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for InMemoryBackend {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.keyspace().get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.keyspace().set(key, value);
        Ok(())
    }

    fn set_nx(&self, key: &str, value: &str) -> StoreResult<bool> {
        Ok(self.keyspace().set_nx(key, value))
    }

    fn set_xx(&self, key: &str, value: &str) -> StoreResult<bool> {
        Ok(self.keyspace().set_xx(key, value))
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        Ok(self.keyspace().del(key))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.keyspace().exists(key))
    }

    fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        Ok(self.keyspace().expire(key, seconds))
    }

    fn ttl(&self, key: &str) -> StoreResult<Option<u64>> {
        Ok(self.keyspace().ttl(key))
    }

    fn rename_nx(&self, from: &str, to: &str) -> StoreResult<bool> {
        self.keyspace().rename_nx(from, to)
    }

    fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.keyspace().lpush(key, value)
    }

    fn rpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.keyspace().rpush(key, value)
    }

    fn rpush_x(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.keyspace().rpush_x(key, value)
    }

    fn llen(&self, key: &str) -> StoreResult<u64> {
        self.keyspace().llen(key)
    }

    fn lrem(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.keyspace().lrem(key, value)
    }

    fn lrange(&self, key: &str) -> StoreResult<Vec<String>> {
        self.keyspace().lrange(key)
    }

    fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.keyspace().sadd(key, member)
    }

    fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.keyspace().srem(key, member)
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.keyspace().smembers(key)
    }

    fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<bool> {
        self.keyspace().zadd(key, member, score)
    }

    fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.keyspace().zrem(key, member)
    }

    fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        self.keyspace().zscore(key, member)
    }

    fn eval(&self, script: StoreScript, keys: &[String], args: &[String]) -> StoreResult<Option<i64>> {
        self.keyspace().run_script(script, keys, args)
    }
}

//! Atomic server-side scripts.
//!
//! Every multi-key transition of the protocol runs as one of these, so no
//! client can observe it half-applied. Each variant documents its `KEYS` and
//! `ARGV` layout; the reply is an integer or nil (`false` in Lua).

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScript {
    /// KEYS [UNASSIGNED_SET, QUEUE] ARGV [SHARD, PAYLOAD].
    /// Registers the shard and pushes the entry; replies with the queue length.
    EnqueueUnassigned,
    /// KEYS [DELAYED_AT, DELAYED_SCHEDULE] ARGV [PAYLOAD, TIMESTAMP].
    /// Appends to the timestamp bucket and indexes the timestamp.
    ScheduleDelayed,
    /// KEYS [UNCOMMITTED] ARGV [PAYLOAD].
    /// Creates the list with its first entry; nil if the key already exists.
    InitializeBatch,
    /// KEYS [COMMITTED_INDEX, COMMITTED, UNCOMMITTED] ARGV [BATCH_ID].
    /// Renames uncommitted to committed unless the target exists, drops the
    /// expiry and records the id; nil if the rename did not happen.
    CommitBatch,
    /// KEYS [STATE, DEFERRED] ARGV [RUNNING_STATE, PAYLOAD].
    /// Stores the payload in an empty deferred slot while the state is
    /// running; nil otherwise.
    DeferUnique,
    /// KEYS [STATE] ARGV [QUEUED_STATE].
    /// Deletes the record if it still holds the given state; nil otherwise.
    ReleaseUnique,
    /// KEYS [PLAN, PLAN_SCHEDULE, PLAN_TIMESTAMP, PLAN_LIST]
    /// ARGV [PLAN_DATA, NEXT_RUN_TIMESTAMP, PLAN_ID].
    /// Creates the plan and indexes it; nil if the plan key already exists.
    InsertPlan,
    /// KEYS [PLAN_SCHEDULE, PLAN_TIMESTAMP] ARGV [TIMESTAMP].
    /// Drops an empty timestamp bucket and its schedule entry; 1 if it did.
    CleanPlanTimestamp,
}

const ENQUEUE_UNASSIGNED: &str = r#"
redis.call('sadd', KEYS[1], ARGV[1])
return redis.call('lpush', KEYS[2], ARGV[2])
"#;

const SCHEDULE_DELAYED: &str = r#"
local length = redis.call('rpush', KEYS[1], ARGV[1])
redis.call('zadd', KEYS[2], ARGV[2], ARGV[2])
return length
"#;

const INITIALIZE_BATCH: &str = r#"
if 1 == redis.call('exists', KEYS[1]) then
    return false
end
return redis.call('lpush', KEYS[1], ARGV[1])
"#;

const COMMIT_BATCH: &str = r#"
if 1 ~= redis.pcall('renamenx', KEYS[3], KEYS[2]) then
    return false
end
redis.call('persist', KEYS[2])
return redis.call('lpush', KEYS[1], ARGV[1])
"#;

const DEFER_UNIQUE: &str = r#"
if redis.call('get', KEYS[1]) ~= ARGV[1] then
    return false
end
if 1 ~= redis.call('setnx', KEYS[2], ARGV[2]) then
    return false
end
return 1
"#;

const RELEASE_UNIQUE: &str = r#"
if redis.call('get', KEYS[1]) ~= ARGV[1] then
    return false
end
return redis.call('del', KEYS[1])
"#;

const INSERT_PLAN: &str = r#"
if 0 == redis.call('setnx', KEYS[1], ARGV[1]) then
    return false
end
redis.call('zadd', KEYS[2], ARGV[2], ARGV[2])
redis.call('rpush', KEYS[3], ARGV[3])
redis.call('sadd', KEYS[4], ARGV[3])
return 1
"#;

const CLEAN_PLAN_TIMESTAMP: &str = r#"
if 0 == redis.call('llen', KEYS[2]) then
    redis.call('del', KEYS[2])
    redis.call('zrem', KEYS[1], ARGV[1])
    return 1
end
return false
"#;

impl StoreScript {
    pub const ALL: [StoreScript; 8] = [
        StoreScript::EnqueueUnassigned,
        StoreScript::ScheduleDelayed,
        StoreScript::InitializeBatch,
        StoreScript::CommitBatch,
        StoreScript::DeferUnique,
        StoreScript::ReleaseUnique,
        StoreScript::InsertPlan,
        StoreScript::CleanPlanTimestamp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StoreScript::EnqueueUnassigned => "enqueue_unassigned",
            StoreScript::ScheduleDelayed => "schedule_delayed",
            StoreScript::InitializeBatch => "initialize_batch",
            StoreScript::CommitBatch => "commit_batch",
            StoreScript::DeferUnique => "defer_unique",
            StoreScript::ReleaseUnique => "release_unique",
            StoreScript::InsertPlan => "insert_plan",
            StoreScript::CleanPlanTimestamp => "clean_plan_timestamp",
        }
    }

    /// Lua body executed by the store.
    pub fn lua(&self) -> &'static str {
        match self {
            StoreScript::EnqueueUnassigned => ENQUEUE_UNASSIGNED,
            StoreScript::ScheduleDelayed => SCHEDULE_DELAYED,
            StoreScript::InitializeBatch => INITIALIZE_BATCH,
            StoreScript::CommitBatch => COMMIT_BATCH,
            StoreScript::DeferUnique => DEFER_UNIQUE,
            StoreScript::ReleaseUnique => RELEASE_UNIQUE,
            StoreScript::InsertPlan => INSERT_PLAN,
            StoreScript::CleanPlanTimestamp => CLEAN_PLAN_TIMESTAMP,
        }
    }

    /// `(keys, args)` the script expects.
    pub(crate) fn arity(&self) -> (usize, usize) {
        match self {
            StoreScript::EnqueueUnassigned => (2, 2),
            StoreScript::ScheduleDelayed => (2, 2),
            StoreScript::InitializeBatch => (1, 1),
            StoreScript::CommitBatch => (3, 1),
            StoreScript::DeferUnique => (2, 2),
            StoreScript::ReleaseUnique => (1, 1),
            StoreScript::InsertPlan => (4, 3),
            StoreScript::CleanPlanTimestamp => (2, 1),
        }
    }

    pub(crate) fn check_arity(&self, keys: &[String], args: &[String]) -> StoreResult<()> {
        let (key_count, arg_count) = self.arity();
        if keys.len() != key_count || args.len() != arg_count {
            return Err(StoreError::Command(format!(
                "script {} expects {} keys and {} args, got {} and {}",
                self.name(),
                key_count,
                arg_count,
                keys.len(),
                args.len()
            )));
        }
        Ok(())
    }
}

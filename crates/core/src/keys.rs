//! Store key scheme.
//!
//! Producers and consumers must agree on these names; they are part of the
//! wire contract. Segments are joined with [`DELIMITER`].

/// Segment delimiter.
pub const DELIMITER: &str = ":";

const UNASSIGNED: &str = "unassigned";
const UNCOMMITTED: &str = "uncommitted";
const COMMITTED: &str = "committed";
const DELAYED: &str = "delayed";
const DELAYED_QUEUE_SCHEDULE: &str = "delayed_queue_schedule";
const PLAN: &str = "plan";
const PLAN_SCHEDULE: &str = "plan_schedule";
const PLAN_LIST: &str = "plan_list";
const UNIQUE: &str = "unique";

fn of(parts: &[&str]) -> String {
    parts.join(DELIMITER)
}

/// Set of shard identifiers that currently have unassigned work.
pub fn unassigned_set() -> String {
    UNASSIGNED.to_string()
}

/// Shard identifier recorded in [`unassigned_set`] for a source/job pair.
pub fn unassigned_shard(source_id: &str, job_name: &str) -> String {
    of(&[source_id, job_name])
}

/// List of serialized unassigned entries for one shard.
pub fn unassigned_queue(source_id: &str, job_name: &str) -> String {
    of(&[UNASSIGNED, source_id, job_name])
}

pub fn batch_uncommitted(batch_id: &str) -> String {
    of(&[UNCOMMITTED, batch_id])
}

pub fn batch_committed(batch_id: &str) -> String {
    of(&[COMMITTED, batch_id])
}

/// Index of committed batch ids.
pub fn batch_committed_index() -> String {
    COMMITTED.to_string()
}

/// List of serialized jobs due at `at` (epoch seconds).
pub fn delayed(at: i64) -> String {
    of(&[DELAYED, &at.to_string()])
}

pub fn delayed_queue_schedule() -> String {
    DELAYED_QUEUE_SCHEDULE.to_string()
}

/// Serialized planned job.
pub fn plan(plan_id: &str) -> String {
    of(&[PLAN, plan_id])
}

/// Sorted set of timestamps that have at least one pending plan.
pub fn plan_schedule() -> String {
    PLAN_SCHEDULE.to_string()
}

/// Bucket of plan ids due at exactly `timestamp`.
pub fn plan_timestamp(timestamp: i64) -> String {
    of(&[PLAN_SCHEDULE, &timestamp.to_string()])
}

/// Set of plan ids registered by one source.
pub fn plan_list(source_id: &str) -> String {
    of(&[PLAN_LIST, source_id])
}

pub fn unique_state(unique_id: &str) -> String {
    of(&[UNIQUE, unique_id, "state"])
}

pub fn unique_deferred(unique_id: &str) -> String {
    of(&[UNIQUE, unique_id, "deferred"])
}

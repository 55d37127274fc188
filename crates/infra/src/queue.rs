//! Immediate and delayed job queues.

use chrono::Utc;
use quay_core::{CanonicalJob, UnassignedEntry, keys};
use tracing::{debug, instrument};

use crate::backend::StoreScript;
use crate::context::Context;
use crate::error::ProtocolResult;

/// Current time as fractional epoch seconds.
pub(crate) fn epoch_seconds_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    ctx: Context,
}

impl JobQueue {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Wrap `job` as an unassigned entry and push it onto its shard queue.
    ///
    /// Returns the entry id.
    #[instrument(skip(self, job), fields(source_id = job.source_id(), name = job.name()), err)]
    pub fn push_unassigned(&self, job: CanonicalJob) -> ProtocolResult<String> {
        let shard = keys::unassigned_shard(job.source_id(), job.name());
        let queue = keys::unassigned_queue(job.source_id(), job.name());
        let entry = UnassignedEntry::new(job, self.ctx.ids().entry_id(), epoch_seconds_now());
        let payload = entry.to_json_string()?;

        self.ctx.backend().eval(
            StoreScript::EnqueueUnassigned,
            &[keys::unassigned_set(), queue],
            &[shard, payload],
        )?;

        debug!(entry_id = entry.id(), "Job enqueued");
        Ok(entry.id().to_string())
    }

    /// Schedule `job` for `delay_seconds` from now. Returns the due timestamp.
    #[instrument(skip(self, job), fields(source_id = job.source_id(), name = job.name()), err)]
    pub fn push_delayed(&self, delay_seconds: u64, job: &CanonicalJob) -> ProtocolResult<i64> {
        let delay = i64::try_from(delay_seconds).unwrap_or(i64::MAX);
        let at = Utc::now().timestamp().saturating_add(delay);
        let payload = job.to_json_string()?;

        self.ctx.backend().eval(
            StoreScript::ScheduleDelayed,
            &[keys::delayed(at), keys::delayed_queue_schedule()],
            &[payload, at.to_string()],
        )?;

        debug!(at, "Delayed job scheduled");
        Ok(at)
    }
}

#[cfg(test)]
mod tests {
    use quay_core::JobRequest;

    use super::*;

    fn job() -> CanonicalJob {
        CanonicalJob::from(JobRequest::new("Mailer", "crm", "send"))
    }

    #[test]
    fn unassigned_push_registers_the_shard() {
        let ctx = Context::in_memory();
        let queue = JobQueue::new(ctx.clone());

        let id = queue.push_unassigned(job()).unwrap();

        let backend = ctx.backend();
        assert_eq!(backend.smembers("unassigned").unwrap(), vec!["crm:send"]);
        let stored = backend.lrange("unassigned:crm:send").unwrap();
        assert_eq!(stored.len(), 1);

        let entry = UnassignedEntry::from_bytes(stored[0].as_bytes()).unwrap();
        assert_eq!(entry.id(), id);
        assert_eq!(entry.job(), &job());
        assert!(entry.queue_time() > 0.0);
    }

    #[test]
    fn newest_unassigned_entry_is_at_the_head() {
        let ctx = Context::in_memory();
        let queue = JobQueue::new(ctx.clone());

        let first = queue.push_unassigned(job()).unwrap();
        let second = queue.push_unassigned(job()).unwrap();

        let stored = ctx.backend().lrange("unassigned:crm:send").unwrap();
        let ids: Vec<String> = stored
            .iter()
            .map(|raw| UnassignedEntry::from_bytes(raw.as_bytes()).unwrap().id().to_string())
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn delayed_push_fills_bucket_and_schedule() {
        let ctx = Context::in_memory();
        let queue = JobQueue::new(ctx.clone());

        let at = queue.push_delayed(120, &job()).unwrap();

        assert!(at >= Utc::now().timestamp() + 119);
        let backend = ctx.backend();
        let bucket = backend.lrange(&keys::delayed(at)).unwrap();
        assert_eq!(CanonicalJob::from_bytes(bucket[0].as_bytes()).unwrap(), job());
        assert_eq!(
            backend.zscore("delayed_queue_schedule", &at.to_string()).unwrap(),
            Some(at as f64)
        );
    }
}

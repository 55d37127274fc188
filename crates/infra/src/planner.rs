//! Recurring job planner.
//!
//! Per plan the store holds:
//! - `plan:<id>`: the serialized `PlannedJob`
//! - `plan_schedule:<ts>`: ids due at `ts`, indexed by the `plan_schedule` sorted set
//! - `plan_list:<source>`: every plan id of a source
//!
//! Insertion is one script. Removal is a few plain commands followed by
//! the cleanup script, so a concurrent insert at the same timestamp may see
//! its bucket briefly emptied and recreated; it never loses its entry.

use chrono::{DateTime, Utc};
use quay_core::{CanonicalJob, PlanId, PlannedJob, RecurrenceInterval, keys};
use tracing::{error, info, instrument};

use crate::backend::StoreScript;
use crate::context::Context;
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::retry_on_collision;

#[derive(Debug, Clone)]
pub struct Planner {
    ctx: Context,
}

impl Planner {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Store a recurring plan for `job`, first due at `next_run` or, if that
    /// is already past, at the first recurrence after now.
    ///
    /// Without `explicit_id` a token is generated and regenerated on
    /// collision. An explicit id that is taken fails with `PlanExists`.
    #[instrument(
        skip(self, job, recurrence),
        fields(source_id = job.source_id(), recurrence = %recurrence),
        err
    )]
    pub fn insert(
        &self,
        next_run: DateTime<Utc>,
        recurrence: RecurrenceInterval,
        job: CanonicalJob,
        explicit_id: Option<&str>,
    ) -> ProtocolResult<PlanId> {
        if recurrence.is_zero() {
            return Err(ProtocolError::InvalidRecurrence);
        }
        let explicit_id = explicit_id.filter(|id| !id.is_empty());
        let now = Utc::now().timestamp();

        let plan_id = retry_on_collision(self.ctx.max_id_attempts(), "plan", |_| {
            let token = match explicit_id {
                Some(id) => id.to_string(),
                None => self.ctx.ids().plan_token(),
            };
            let plan_id = PlanId::new(job.source_id(), token);

            let mut planned = PlannedJob::new(plan_id.to_string(), next_run, recurrence, job.clone());
            planned.advance(now)?;

            if self.try_insert(&planned)? {
                return Ok(Some(plan_id));
            }
            match explicit_id {
                Some(_) => Err(ProtocolError::PlanExists {
                    plan_id: plan_id.to_string(),
                }),
                None => Ok(None),
            }
        })?;

        info!(plan_id = %plan_id, "Plan inserted");
        Ok(plan_id)
    }

    fn try_insert(&self, planned: &PlannedJob) -> ProtocolResult<bool> {
        let at = planned.next_run_timestamp();
        let reply = self.ctx.backend().eval(
            StoreScript::InsertPlan,
            &[
                keys::plan(planned.id()),
                keys::plan_schedule(),
                keys::plan_timestamp(at),
                keys::plan_list(planned.job().source_id()),
            ],
            &[planned.to_json_string()?, at.to_string(), planned.id().to_string()],
        )?;
        Ok(reply.is_some())
    }

    /// Look up a plan of `source_id`.
    ///
    /// A stored payload that does not decode is logged and reported as
    /// absent.
    pub fn get(&self, source_id: &str, plan_id: &str) -> ProtocolResult<Option<PlannedJob>> {
        let plan_id = PlanId::parse_for(source_id, plan_id).map_err(ProtocolError::from_plan_id)?;
        self.load(&plan_id)
    }

    fn load(&self, plan_id: &PlanId) -> ProtocolResult<Option<PlannedJob>> {
        let Some(raw) = self.ctx.backend().get(&keys::plan(&plan_id.to_string()))? else {
            return Ok(None);
        };
        match PlannedJob::from_bytes(raw.as_bytes()) {
            Ok(planned) => Ok(Some(planned)),
            Err(e) => {
                error!(plan_id = %plan_id, payload = %raw, error = %e, "Failed to decode planned job");
                Ok(None)
            }
        }
    }

    /// Ids of every plan registered for `source_id`, sorted.
    pub fn list_ids(&self, source_id: &str) -> ProtocolResult<Vec<String>> {
        let mut ids = self.ctx.backend().smembers(&keys::plan_list(source_id))?;
        ids.sort();
        Ok(ids)
    }

    /// Delete a plan. Returns false if there was no readable plan under the id.
    #[instrument(skip(self), err)]
    pub fn remove(&self, source_id: &str, plan_id: &str) -> ProtocolResult<bool> {
        let plan_id = PlanId::parse_for(source_id, plan_id).map_err(ProtocolError::from_plan_id)?;
        let raw_id = plan_id.to_string();

        let planned = self.load(&plan_id)?;
        let backend = self.ctx.backend();
        backend.del(&keys::plan(&raw_id))?;

        let Some(planned) = planned else {
            return Ok(false);
        };

        let at = planned.next_run_timestamp();
        backend.lrem(&keys::plan_timestamp(at), &raw_id)?;
        backend.srem(&keys::plan_list(planned.job().source_id()), &raw_id)?;
        self.clean_timestamp(at)?;

        info!(plan_id = %raw_id, "Plan removed");
        Ok(true)
    }

    /// Drop the bucket for `at` and its schedule entry once no plan is left in it.
    fn clean_timestamp(&self, at: i64) -> ProtocolResult<bool> {
        let reply = self.ctx.backend().eval(
            StoreScript::CleanPlanTimestamp,
            &[keys::plan_schedule(), keys::plan_timestamp(at)],
            &[at.to_string()],
        )?;
        Ok(reply.is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use quay_core::JobRequest;

    use super::*;
    use crate::ids::FixedIds;

    fn job() -> CanonicalJob {
        CanonicalJob::from(JobRequest::new("Report", "crm", "nightly"))
    }

    fn ctx_with_tokens(tokens: &[&str]) -> Context {
        let ids = FixedIds::new().with_plan_tokens(tokens.iter().copied());
        Context::in_memory().with_ids(Arc::new(ids))
    }

    #[test]
    fn insert_indexes_the_plan() {
        let ctx = ctx_with_tokens(&["t1"]);
        let planner = Planner::new(ctx.clone());
        let next_run = Utc::now() + Duration::hours(2);

        let id = planner
            .insert(next_run, RecurrenceInterval::days(1), job(), None)
            .unwrap();

        assert_eq!(id.to_string(), "crm_t1");
        let at = next_run.timestamp();
        let backend = ctx.backend();
        assert_eq!(backend.lrange(&keys::plan_timestamp(at)).unwrap(), vec!["crm_t1"]);
        assert_eq!(backend.zscore("plan_schedule", &at.to_string()).unwrap(), Some(at as f64));
        assert_eq!(planner.list_ids("crm").unwrap(), vec!["crm_t1"]);

        let stored = planner.get("crm", "crm_t1").unwrap().unwrap();
        assert_eq!(stored.next_run_timestamp(), at);
        assert_eq!(stored.job(), &job());
    }

    #[test]
    fn past_next_run_moves_to_first_boundary_after_now() {
        let planner = Planner::new(Context::in_memory());
        let original = Utc::now() - Duration::seconds(7200);

        let id = planner
            .insert(original, RecurrenceInterval::hours(1), job(), Some("hourly"))
            .unwrap();

        let now = Utc::now().timestamp();
        let planned = planner.get("crm", &id.to_string()).unwrap().unwrap();
        let next = planned.next_run_timestamp();
        assert!(next > now - 1 && next <= now + 3600);
        assert_eq!((next - original.timestamp()) % 3600, 0);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let planner = Planner::new(Context::in_memory());

        let err = planner
            .insert(Utc::now(), RecurrenceInterval::default(), job(), None)
            .unwrap_err();

        assert!(matches!(err, ProtocolError::InvalidRecurrence));
    }

    #[test]
    fn generated_id_collision_is_retried() {
        let planner = Planner::new(ctx_with_tokens(&["same", "same", "other"]));
        let next_run = Utc::now() + Duration::hours(1);

        let first = planner.insert(next_run, RecurrenceInterval::hours(1), job(), None).unwrap();
        let second = planner.insert(next_run, RecurrenceInterval::hours(1), job(), None).unwrap();

        assert_eq!(first.to_string(), "crm_same");
        assert_eq!(second.to_string(), "crm_other");
        assert_eq!(planner.list_ids("crm").unwrap(), vec!["crm_other", "crm_same"]);
    }

    #[test]
    fn explicit_id_collision_fails_immediately() {
        let planner = Planner::new(Context::in_memory());
        let next_run = Utc::now() + Duration::hours(1);
        planner
            .insert(next_run, RecurrenceInterval::hours(1), job(), Some("nightly"))
            .unwrap();

        let err = planner
            .insert(next_run, RecurrenceInterval::hours(1), job(), Some("nightly"))
            .unwrap_err();

        assert!(matches!(err, ProtocolError::PlanExists { plan_id } if plan_id == "crm_nightly"));
    }

    #[test]
    fn removing_last_plan_cleans_its_bucket() {
        let ctx = Context::in_memory();
        let planner = Planner::new(ctx.clone());
        let next_run = Utc::now() + Duration::hours(3);
        let at = next_run.timestamp();
        planner
            .insert(next_run, RecurrenceInterval::hours(1), job(), Some("a"))
            .unwrap();
        planner
            .insert(next_run, RecurrenceInterval::hours(1), job(), Some("b"))
            .unwrap();

        assert!(planner.remove("crm", "crm_a").unwrap());
        let backend = ctx.backend();
        assert_eq!(backend.lrange(&keys::plan_timestamp(at)).unwrap(), vec!["crm_b"]);
        assert!(backend.zscore("plan_schedule", &at.to_string()).unwrap().is_some());

        assert!(planner.remove("crm", "crm_b").unwrap());
        assert!(!backend.exists(&keys::plan_timestamp(at)).unwrap());
        assert_eq!(backend.zscore("plan_schedule", &at.to_string()).unwrap(), None);
        assert!(planner.list_ids("crm").unwrap().is_empty());
        assert!(planner.get("crm", "crm_b").unwrap().is_none());
    }

    #[test]
    fn removing_unknown_plan_returns_false() {
        let planner = Planner::new(Context::in_memory());

        assert!(!planner.remove("crm", "crm_missing").unwrap());
    }

    #[test]
    fn ids_must_belong_to_the_source() {
        let planner = Planner::new(Context::in_memory());

        assert!(matches!(
            planner.get("billing", "crm_nightly"),
            Err(ProtocolError::InvalidPlanId { .. })
        ));
        assert!(matches!(
            planner.remove("billing", "crm_nightly"),
            Err(ProtocolError::InvalidPlanId { .. })
        ));
    }

    #[test]
    fn malformed_plan_reads_as_absent_and_is_still_removed() {
        let ctx = Context::in_memory();
        ctx.backend().set("plan:crm_bad", "{\"class\":").unwrap();
        let planner = Planner::new(ctx.clone());

        assert!(planner.get("crm", "crm_bad").unwrap().is_none());
        assert!(!planner.remove("crm", "crm_bad").unwrap());
        assert!(!ctx.backend().exists("plan:crm_bad").unwrap());
    }
}

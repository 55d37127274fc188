//! Recurring job template.
//!
//! `nextRun` and `recurrenceInterval` are read by the planner reaper under
//! these exact names.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::interval::RecurrenceInterval;
use crate::job::{CanonicalJob, decode_object, normalize_job_fields};

/// A job template plus its recurrence rule and next due time.
///
/// `next_run` has second precision; it is stored as integer epoch seconds
/// under `nextRun` next to the job's own fields, `id` and
/// `recurrenceInterval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedJob {
    #[serde(flatten)]
    job: CanonicalJob,
    id: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    next_run: DateTime<Utc>,
    recurrence_interval: RecurrenceInterval,
}

impl PlannedJob {
    /// Build a plan; sub-second precision of `next_run` is dropped.
    pub fn new(
        id: impl Into<String>,
        next_run: DateTime<Utc>,
        recurrence_interval: RecurrenceInterval,
        job: CanonicalJob,
    ) -> Self {
        let whole_seconds = DateTime::from_timestamp(next_run.timestamp(), 0).unwrap_or(next_run);
        Self {
            job,
            id: id.into(),
            next_run: whole_seconds,
            recurrence_interval,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> EnvelopeResult<Self> {
        let mut map = decode_object(bytes)?;
        normalize_job_fields(&mut map)?;

        for field in ["id", "recurrenceInterval"] {
            match map.get(field) {
                Some(JsonValue::String(_)) => {}
                Some(_) => return Err(EnvelopeError::invalid_field(field, "a string")),
                None => return Err(EnvelopeError::MissingField(field)),
            }
        }
        match map.get("nextRun") {
            Some(value) if value.is_i64() => {}
            Some(_) => return Err(EnvelopeError::invalid_field("nextRun", "an integer timestamp")),
            None => return Err(EnvelopeError::MissingField("nextRun")),
        }

        Ok(serde_json::from_value(JsonValue::Object(map))?)
    }

    pub fn to_json_string(&self) -> EnvelopeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn job(&self) -> &CanonicalJob {
        &self.job
    }

    pub fn next_run(&self) -> DateTime<Utc> {
        self.next_run
    }

    pub fn next_run_timestamp(&self) -> i64 {
        self.next_run.timestamp()
    }

    pub fn recurrence_interval(&self) -> RecurrenceInterval {
        self.recurrence_interval
    }

    /// Move `next_run` to the first `next_run + k * interval` strictly after
    /// `threshold` (epoch seconds). Leaves it untouched if it already is.
    ///
    /// Zero intervals are rejected since they could never pass the threshold.
    pub fn advance(&mut self, threshold: i64) -> EnvelopeResult<()> {
        if self.next_run.timestamp() > threshold {
            return Ok(());
        }
        if self.recurrence_interval.is_zero() {
            return Err(EnvelopeError::ZeroInterval);
        }

        if let Some(step) = self.recurrence_interval.fixed_seconds() {
            let behind = threshold - self.next_run.timestamp();
            let steps = behind / step + 1;
            let shift = steps
                .checked_mul(step)
                .and_then(Duration::try_seconds)
                .ok_or(EnvelopeError::IntervalOverflow)?;
            self.next_run = self
                .next_run
                .checked_add_signed(shift)
                .ok_or(EnvelopeError::IntervalOverflow)?;
            return Ok(());
        }

        let anchor = self.next_run;
        let mut times: u32 = 1;
        loop {
            let candidate = self
                .recurrence_interval
                .add_times(anchor, times)
                .ok_or(EnvelopeError::IntervalOverflow)?;
            if candidate.timestamp() > threshold {
                self.next_run = candidate;
                return Ok(());
            }
            times = times.checked_add(1).ok_or(EnvelopeError::IntervalOverflow)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobRequest;
    use chrono::TimeZone;
    use serde_json::json;

    fn job() -> CanonicalJob {
        CanonicalJob::from(JobRequest::new("Report", "crm", "report").with_args(vec![json!(7)]))
    }

    fn at(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap()
    }

    #[test]
    fn serializes_next_run_as_epoch_seconds() {
        let plan = PlannedJob::new("crm_1", at(1_700_000_000), RecurrenceInterval::hours(1), job());
        let value: JsonValue = serde_json::from_str(&plan.to_json_string().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "class": "Report",
                "args": [7],
                "sourceId": "crm",
                "name": "report",
                "id": "crm_1",
                "nextRun": 1_700_000_000,
                "recurrenceInterval": "P0Y0M0DT1H0M0S"
            })
        );
    }

    #[test]
    fn decoding_reproduces_the_plan() {
        let plan = PlannedJob::new("crm_1", at(1_700_000_000), RecurrenceInterval::new(0, 1, 2, 0, 0, 0), job());
        let decoded = PlannedJob::from_bytes(plan.to_json_string().unwrap().as_bytes()).unwrap();

        assert_eq!(decoded, plan);
    }

    #[test]
    fn rejects_bad_plan_fields() {
        let err = PlannedJob::from_bytes(
            br#"{"class":"R","sourceId":"crm","name":"r","id":"crm_1","nextRun":"later","recurrenceInterval":"PT1H"}"#,
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::invalid_field("nextRun", "an integer timestamp"));

        let err = PlannedJob::from_bytes(
            br#"{"class":"R","sourceId":"crm","name":"r","id":"crm_1","nextRun":1,"recurrenceInterval":"hourly"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidJson(_)));
    }

    #[test]
    fn advance_moves_to_first_boundary_after_threshold() {
        let now = 1_700_000_000;
        let mut plan = PlannedJob::new("crm_1", at(now - 7_200), RecurrenceInterval::hours(1), job());

        plan.advance(now).unwrap();

        assert_eq!(plan.next_run_timestamp(), now + 3_600);
    }

    #[test]
    fn advance_is_strictly_greater_than_threshold() {
        let mut plan = PlannedJob::new("crm_1", at(1_000), RecurrenceInterval::seconds(10), job());

        plan.advance(1_000).unwrap();
        assert_eq!(plan.next_run_timestamp(), 1_010);

        plan.advance(1_015).unwrap();
        assert_eq!(plan.next_run_timestamp(), 1_020);
    }

    #[test]
    fn advance_leaves_future_plans_alone() {
        let mut plan = PlannedJob::new("crm_1", at(5_000), RecurrenceInterval::seconds(10), job());

        plan.advance(1_000).unwrap();

        assert_eq!(plan.next_run_timestamp(), 5_000);
    }

    #[test]
    fn advance_counts_calendar_months_from_the_anchor() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();

        let mut plan = PlannedJob::new("crm_1", start, RecurrenceInterval::months(1), job());
        plan.advance(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap().timestamp()).unwrap();
        // Feb 31 rolls over.
        assert_eq!(plan.next_run(), Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());

        let mut plan = PlannedJob::new("crm_1", start, RecurrenceInterval::months(1), job());
        plan.advance(Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap().timestamp()).unwrap();
        assert_eq!(plan.next_run(), Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap());
    }

    #[test]
    fn advance_rejects_zero_interval() {
        let mut plan = PlannedJob::new("crm_1", at(1_000), RecurrenceInterval::default(), job());

        assert_eq!(plan.advance(2_000).unwrap_err(), EnvelopeError::ZeroInterval);
    }

    #[test]
    fn new_truncates_to_whole_seconds() {
        let precise = DateTime::from_timestamp(1_700_000_000, 900_000_000).unwrap();
        let plan = PlannedJob::new("crm_1", precise, RecurrenceInterval::hours(1), job());

        assert_eq!(plan.next_run(), at(1_700_000_000));
    }
}

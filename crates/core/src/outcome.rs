//! Result a worker reports after running a job.
//!
//! Retry and reschedule requests cross into the reaper's scheduling logic,
//! so they are values rather than failures. Older workers signal them through
//! numeric codes; [`Outcome::signal`] and [`Outcome::from_signal`] map between
//! the two.

use serde::{Deserialize, Serialize};

/// Signal code for a reschedule request.
pub const CODE_RESCHEDULE: i32 = -1;
/// Signal code for a retry request.
pub const CODE_RETRY: i32 = -2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The job finished.
    Success,
    /// Run the job again as soon as possible.
    RetryRequested,
    /// Run the job again after `delay` seconds.
    RescheduleRequested { delay: u64 },
}

#[derive(Serialize, Deserialize)]
struct ReschedulePayload {
    delay: u64,
}

impl Outcome {
    pub fn reschedule(delay: u64) -> Self {
        Self::RescheduleRequested { delay }
    }

    /// Legacy `(code, message)` pair, `None` for success.
    pub fn signal(&self) -> Option<(i32, String)> {
        match self {
            Outcome::Success => None,
            Outcome::RetryRequested => Some((CODE_RETRY, String::new())),
            Outcome::RescheduleRequested { delay } => {
                let payload = serde_json::to_string(&ReschedulePayload { delay: *delay })
                    .unwrap_or_else(|_| format!("{{\"delay\":{delay}}}"));
                Some((CODE_RESCHEDULE, payload))
            }
        }
    }

    /// Interpret a legacy signal. Unknown codes yield `None`; a reschedule
    /// message that cannot be read means "no delay".
    pub fn from_signal(code: i32, message: &str) -> Option<Self> {
        match code {
            CODE_RETRY => Some(Outcome::RetryRequested),
            CODE_RESCHEDULE => {
                let delay = serde_json::from_str::<ReschedulePayload>(message)
                    .map(|payload| payload.delay)
                    .unwrap_or(0);
                Some(Outcome::RescheduleRequested { delay })
            }
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

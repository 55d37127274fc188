//! Uniqueness tracker: at most one active instance per unique id.
//!
//! Per id the store holds `unique:<id>:state` (`queued` or `running`) and,
//! while running, at most one deferred payload in `unique:<id>:deferred`.
//! Workers move the state to `running` and delete it on completion; this
//! side creates it, and drops it again only when the push it guarded failed.

use std::fmt;
use std::str::FromStr;

use quay_core::{CanonicalJob, keys};
use tracing::{error, info, instrument};

use crate::backend::StoreScript;
use crate::context::Context;
use crate::error::{ProtocolError, ProtocolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniqueState {
    Queued,
    Running,
}

impl UniqueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniqueState::Queued => "queued",
            UniqueState::Running => "running",
        }
    }
}

impl fmt::Display for UniqueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UniqueState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(UniqueState::Queued),
            "running" => Ok(UniqueState::Running),
            other => Err(format!("unknown unique state `{other}`")),
        }
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The job may be queued now.
    Admitted,
    /// The job was parked behind the running instance and must not be queued.
    Deferred,
}

#[derive(Debug, Clone)]
pub struct UniqueTracker {
    ctx: Context,
}

impl UniqueTracker {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Gate a job on its unique id.
    ///
    /// Jobs without a unique id are always admitted. With `ignore_conflicts`
    /// an existing record is tolerated and the job admitted anyway.
    #[instrument(skip(self, job), fields(unique_id = job.unique_id().unwrap_or("")), err)]
    pub fn register(&self, job: &CanonicalJob, ignore_conflicts: bool) -> ProtocolResult<Admission> {
        let Some(unique_id) = job.unique_id() else {
            return Ok(Admission::Admitted);
        };

        let state_key = keys::unique_state(unique_id);
        if self.ctx.backend().set_nx(&state_key, UniqueState::Queued.as_str())? || ignore_conflicts {
            return Ok(Admission::Admitted);
        }

        let deferrable = job.unique().is_some_and(|unique| unique.is_deferred());
        if deferrable && self.defer(unique_id, job)? {
            info!(unique_id, "Job deferred behind running instance");
            return Ok(Admission::Deferred);
        }

        info!(unique_id, "Duplicate unique job rejected");
        Err(ProtocolError::DuplicateUnique {
            unique_id: unique_id.to_string(),
        })
    }

    /// Park `job` in the deferred slot if the id is running and the slot is free.
    fn defer(&self, unique_id: &str, job: &CanonicalJob) -> ProtocolResult<bool> {
        let payload = job.to_json_string()?;
        let reply = self.ctx.backend().eval(
            StoreScript::DeferUnique,
            &[keys::unique_state(unique_id), keys::unique_deferred(unique_id)],
            &[UniqueState::Running.as_str().to_string(), payload],
        )?;
        Ok(reply.is_some())
    }

    /// Drop a record this producer created if it is still `queued`.
    ///
    /// Used when the push that followed a successful [`register`] failed, so
    /// the id is not blocked by a job that never reached a queue. A record a
    /// worker already moved to `running` is left alone.
    ///
    /// [`register`]: UniqueTracker::register
    pub fn release(&self, unique_id: &str) -> ProtocolResult<bool> {
        let reply = self.ctx.backend().eval(
            StoreScript::ReleaseUnique,
            &[keys::unique_state(unique_id)],
            &[UniqueState::Queued.as_str().to_string()],
        )?;
        Ok(reply.is_some())
    }

    /// Update an existing record's state; never creates one.
    ///
    /// An empty id is trivially successful.
    pub fn transition_state(&self, unique_id: &str, state: UniqueState) -> ProtocolResult<bool> {
        if unique_id.is_empty() {
            return Ok(true);
        }
        Ok(self
            .ctx
            .backend()
            .set_xx(&keys::unique_state(unique_id), state.as_str())?)
    }

    /// Current state, `None` when absent or unreadable.
    pub fn state(&self, unique_id: &str) -> ProtocolResult<Option<UniqueState>> {
        let Some(raw) = self.ctx.backend().get(&keys::unique_state(unique_id))? else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                error!(unique_id, raw = %raw, error = %e, "Unreadable unique state");
                Ok(None)
            }
        }
    }

    /// The job parked behind the running instance, if any.
    pub fn deferred_job(&self, unique_id: &str) -> ProtocolResult<Option<CanonicalJob>> {
        let Some(raw) = self.ctx.backend().get(&keys::unique_deferred(unique_id))? else {
            return Ok(None);
        };
        match CanonicalJob::from_bytes(raw.as_bytes()) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                error!(unique_id, payload = %raw, error = %e, "Malformed deferred job");
                Ok(None)
            }
        }
    }
}

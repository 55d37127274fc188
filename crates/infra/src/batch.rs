//! Two-phase batches: accumulate under `uncommitted:<id>`, publish by
//! renaming to `committed:<id>`.
//!
//! The uncommitted list expires `ttl` seconds after the last push, so an
//! abandoned batch never becomes visible. Commit is a single script; a
//! push racing a commit from another handle is not ordered by the client
//! and may land just before the rename or fail with `BatchExpired`.

use std::fmt;

use quay_core::{CanonicalJob, UnassignedEntry, keys};
use tracing::{debug, info, instrument};

use crate::backend::StoreScript;
use crate::context::Context;
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::retry_on_collision;
use crate::queue::epoch_seconds_now;

/// Default time-to-live of an uncommitted batch.
pub const DEFAULT_BATCH_TTL: u64 = 3600;

#[derive(Clone)]
pub struct Batch {
    ctx: Context,
    ttl: u64,
    batch_id: Option<String>,
    committed: bool,
}

impl Batch {
    /// Empty batch; no key exists until the first push.
    pub fn new(ctx: Context, ttl_seconds: u64) -> Self {
        Self {
            ctx,
            ttl: ttl_seconds.max(1),
            batch_id: None,
            committed: false,
        }
    }

    /// Handle to an already committed batch, `None` if it does not exist.
    pub fn load(ctx: Context, batch_id: &str) -> ProtocolResult<Option<Self>> {
        if !ctx.backend().exists(&keys::batch_committed(batch_id))? {
            return Ok(None);
        }
        Ok(Some(Self {
            ctx,
            ttl: DEFAULT_BATCH_TTL,
            batch_id: Some(batch_id.to_string()),
            committed: true,
        }))
    }

    /// `<source>:<name>:<suffix>`, assigned by the first push.
    pub fn id(&self) -> Option<&str> {
        self.batch_id.as_deref()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    #[instrument(skip(self, job), fields(batch_id = self.batch_id.as_deref().unwrap_or("")), err)]
    pub fn push(&mut self, job: impl Into<CanonicalJob>) -> ProtocolResult<()> {
        if self.committed {
            return Err(ProtocolError::BatchAlreadyCommitted);
        }

        let entry = UnassignedEntry::new(job.into(), self.ctx.ids().entry_id(), epoch_seconds_now());
        let payload = entry.to_json_string()?;
        let backend = self.ctx.backend();

        let uncommitted = match self.batch_id.clone() {
            Some(batch_id) => {
                let key = keys::batch_uncommitted(&batch_id);
                if backend.rpush_x(&key, &payload)? == 0 {
                    return Err(ProtocolError::BatchExpired);
                }
                key
            }
            None => {
                let batch_id = self.initialize(entry.job(), &payload)?;
                let key = keys::batch_uncommitted(&batch_id);
                self.batch_id = Some(batch_id);
                key
            }
        };

        backend.expire(&uncommitted, self.ttl)?;
        Ok(())
    }

    /// Create the uncommitted list under a fresh id; returns the id.
    fn initialize(&self, job: &CanonicalJob, payload: &str) -> ProtocolResult<String> {
        let ctx = &self.ctx;
        retry_on_collision(ctx.max_id_attempts(), "batch", |_| {
            let batch_id = format!(
                "{}:{}:{}",
                job.source_id(),
                job.name(),
                ctx.ids().batch_suffix()
            );
            let created = ctx.backend().eval(
                StoreScript::InitializeBatch,
                &[keys::batch_uncommitted(&batch_id)],
                &[payload.to_string()],
            )?;
            Ok(created.map(|_| batch_id))
        })
    }

    /// Publish the batch; returns its id.
    ///
    /// Fails with `BatchCommitFailed` when the uncommitted list is gone
    /// (expired, or already committed by this or another handle).
    #[instrument(skip(self), fields(batch_id = self.batch_id.as_deref().unwrap_or("")), err)]
    pub fn commit(&mut self) -> ProtocolResult<String> {
        let Some(batch_id) = self.batch_id.clone() else {
            return Err(ProtocolError::EmptyBatch);
        };

        let reply = self.ctx.backend().eval(
            StoreScript::CommitBatch,
            &[
                keys::batch_committed_index(),
                keys::batch_committed(&batch_id),
                keys::batch_uncommitted(&batch_id),
            ],
            &[batch_id.clone()],
        )?;
        if reply.is_none() {
            debug!("Commit script refused the rename");
            return Err(ProtocolError::BatchCommitFailed);
        }

        self.committed = true;
        info!(batch_id = %batch_id, "Batch committed");
        Ok(batch_id)
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("batch_id", &self.batch_id)
            .field("ttl", &self.ttl)
            .field("committed", &self.committed)
            .finish()
    }
}

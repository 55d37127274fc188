//! Producer façade.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quay_core::{CanonicalJob, JobRequest, PlanId, PlannedJob, RecurrenceInterval};
use quay_infra::{
    Admission, Backend, Batch, Context, JobQueue, Planner, ProtocolResult, RedisBackend,
    UniqueTracker,
};
use tracing::{debug, info, instrument, warn};

use crate::config::{ClientConfig, normalize_server};
use crate::error::ClientResult;

/// Wire protocol generation this client speaks. Informational; keys are
/// not prefixed with it.
pub const PROTOCOL_VERSION: &str = "resqu-v4";

/// What happened to an enqueued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// Pushed to its unassigned queue under `id`.
    Queued { id: String },
    /// Scheduled for epoch second `at`.
    Delayed { at: i64 },
    /// Parked behind a running job with the same unique id; not queued now.
    Deferred,
}

impl Enqueued {
    pub fn id(&self) -> Option<&str> {
        match self {
            Enqueued::Queued { id } => Some(id),
            _ => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Enqueued::Deferred)
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    ctx: Context,
    config: ClientConfig,
}

impl Client {
    /// Client for the Redis server in `config`. Connects on first use.
    pub fn connect(config: ClientConfig) -> ClientResult<Self> {
        let backend = RedisBackend::open(&config.server)?;
        info!(server = %config.server, protocol = PROTOCOL_VERSION, "Queue client configured");
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::connect(ClientConfig::from_env()?)
    }

    /// Client over an arbitrary store, e.g. `InMemoryBackend` in tests.
    pub fn with_backend(backend: Arc<dyn Backend>, config: ClientConfig) -> Self {
        let ctx = Context::new(backend).with_max_id_attempts(config.max_id_attempts);
        Self { ctx, config }
    }

    /// Client over a prepared context (custom id generation and the like).
    pub fn with_context(ctx: Context, config: ClientConfig) -> Self {
        Self { ctx, config }
    }

    /// Point the client at another Redis server (`host:port` or a URL).
    ///
    /// Batches created earlier keep talking to the old server.
    pub fn set_backend(&mut self, server: &str) -> ClientResult<()> {
        let server = normalize_server(server);
        let backend = RedisBackend::open(&server)?;
        self.ctx = self.ctx.clone().with_backend(Arc::new(backend));
        info!(server = %server, protocol = PROTOCOL_VERSION, "Queue backend switched");
        self.config.server = server;
        Ok(())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Queue a job for immediate pickup.
    ///
    /// If the push fails after the unique id was claimed, the claim is
    /// released so a retry is not rejected as a duplicate.
    #[instrument(skip(self, request), fields(source_id = %request.source_id, name = %request.name), err)]
    pub fn enqueue(&self, request: JobRequest) -> ClientResult<Enqueued> {
        let job = CanonicalJob::from(request);
        if self.unique().register(&job, false)? == Admission::Deferred {
            return Ok(Enqueued::Deferred);
        }

        let unique_id = job.unique_id().map(str::to_string);
        let pushed = JobQueue::new(self.ctx.clone()).push_unassigned(job);
        let id = self.release_on_error(unique_id.as_deref(), pushed)?;
        Ok(Enqueued::Queued { id })
    }

    /// Queue a job to become due `delay_seconds` from now.
    #[instrument(skip(self, request), fields(source_id = %request.source_id, name = %request.name), err)]
    pub fn enqueue_delayed(&self, delay_seconds: u64, request: JobRequest) -> ClientResult<Enqueued> {
        let job = CanonicalJob::from(request);
        if self.unique().register(&job, false)? == Admission::Deferred {
            return Ok(Enqueued::Deferred);
        }

        let pushed = JobQueue::new(self.ctx.clone()).push_delayed(delay_seconds, &job);
        let at = self.release_on_error(job.unique_id(), pushed)?;
        Ok(Enqueued::Delayed { at })
    }

    fn release_on_error<T>(
        &self,
        unique_id: Option<&str>,
        pushed: ProtocolResult<T>,
    ) -> ClientResult<T> {
        if let (Err(_), Some(unique_id)) = (&pushed, unique_id) {
            match self.unique().release(unique_id) {
                Ok(released) => debug!(unique_id, released, "Unique id released after failed push"),
                Err(e) => warn!(unique_id, error = %e, "Unique id stays claimed after failed push"),
            }
        }
        Ok(pushed?)
    }

    /// Empty batch expiring `ttl_seconds` after its last push.
    pub fn create_batch(&self, ttl_seconds: u64) -> Batch {
        Batch::new(self.ctx.clone(), ttl_seconds)
    }

    /// Empty batch with the configured default expiry.
    pub fn batch(&self) -> Batch {
        self.create_batch(self.config.default_batch_ttl)
    }

    pub fn load_batch(&self, batch_id: &str) -> ClientResult<Option<Batch>> {
        Ok(Batch::load(self.ctx.clone(), batch_id)?)
    }

    pub fn plan_insert(
        &self,
        next_run: DateTime<Utc>,
        recurrence: RecurrenceInterval,
        request: JobRequest,
        explicit_id: Option<&str>,
    ) -> ClientResult<PlanId> {
        let planner = Planner::new(self.ctx.clone());
        Ok(planner.insert(next_run, recurrence, CanonicalJob::from(request), explicit_id)?)
    }

    pub fn plan_get(&self, source_id: &str, plan_id: &str) -> ClientResult<Option<PlannedJob>> {
        Ok(Planner::new(self.ctx.clone()).get(source_id, plan_id)?)
    }

    pub fn plan_list_ids(&self, source_id: &str) -> ClientResult<Vec<String>> {
        Ok(Planner::new(self.ctx.clone()).list_ids(source_id)?)
    }

    pub fn plan_remove(&self, source_id: &str, plan_id: &str) -> ClientResult<bool> {
        let removed = Planner::new(self.ctx.clone()).remove(source_id, plan_id)?;
        debug!(source_id, plan_id, removed, "Plan removal finished");
        Ok(removed)
    }

    /// Tracker for the unique-id records behind `enqueue`.
    pub fn unique(&self) -> UniqueTracker {
        UniqueTracker::new(self.ctx.clone())
    }
}

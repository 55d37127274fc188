//! Protocol and store error taxonomy.

use quay_core::EnvelopeError;

pub type StoreResult<T> = Result<T, StoreError>;
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Failure talking to the key-value store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store command error: {0}")]
    Command(String),

    #[error("unexpected store reply: {0}")]
    Reply(String),
}

/// Everything a producer-side protocol call can fail with.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    MalformedEnvelope(#[from] EnvelopeError),

    #[error("a job with unique id '{unique_id}' is already in queue")]
    DuplicateUnique { unique_id: String },

    #[error("plan {plan_id} already exists")]
    PlanExists { plan_id: String },

    #[error("batch has already been committed")]
    BatchAlreadyCommitted,

    #[error("batch expired")]
    BatchExpired,

    #[error("batch commit failed")]
    BatchCommitFailed,

    #[error("can't commit empty batch")]
    EmptyBatch,

    #[error("plan id `{id}` does not belong to source `{source_id}`")]
    InvalidPlanId { source_id: String, id: String },

    #[error("recurrence interval must be longer than zero")]
    InvalidRecurrence,

    #[error("gave up generating a free {what} id after {attempts} attempts")]
    IdCollisionLimit { what: &'static str, attempts: u32 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl ProtocolError {
    /// Map envelope-level plan id errors onto the protocol's format error.
    pub(crate) fn from_plan_id(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::InvalidPlanId { source_id, id } => Self::InvalidPlanId { source_id, id },
            other => Self::MalformedEnvelope(other),
        }
    }
}

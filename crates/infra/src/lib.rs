//! Store-facing side of the queue protocol: the `Backend` contract and its
//! implementations, plus the components that drive it (unique tracker,
//! queues, batches, planner).

pub mod backend;
pub mod batch;
pub mod context;
pub mod error;
pub mod ids;
pub mod planner;
pub mod queue;
pub mod unique;

pub use backend::{Backend, InMemoryBackend, StoreScript};
#[cfg(feature = "redis")]
pub use backend::RedisBackend;
pub use batch::{Batch, DEFAULT_BATCH_TTL};
pub use context::{Context, DEFAULT_MAX_ID_ATTEMPTS};
pub use error::{ProtocolError, ProtocolResult, StoreError, StoreResult};
pub use ids::{FixedIds, IdGenerator, SystemIds};
pub use planner::Planner;
pub use queue::JobQueue;
pub use unique::{Admission, UniqueState, UniqueTracker};

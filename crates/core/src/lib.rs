//! `quay-core`: protocol values shared by producers and consumers.
//!
//! Pure data: key names, job envelopes and their wire encoding. No store
//! access happens here.

pub mod error;
pub mod id;
pub mod interval;
pub mod job;
pub mod keys;
pub mod outcome;
pub mod planned;
pub mod unassigned;

pub use error::{EnvelopeError, EnvelopeResult};
pub use id::PlanId;
pub use interval::RecurrenceInterval;
pub use job::{CanonicalJob, JobRequest, UniqueDescriptor};
pub use outcome::Outcome;
pub use planned::PlannedJob;
pub use unassigned::UnassignedEntry;

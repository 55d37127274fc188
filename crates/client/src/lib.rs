//! `quay-client`: producer side of the queue: enqueue, batches, plans.
//!
//! ```no_run
//! use quay_client::{Client, ClientConfig, JobRequest};
//!
//! let client = Client::connect(ClientConfig::from_env()?)?;
//! client.enqueue(JobRequest::new("Mailer", "crm", "send"))?;
//! # Ok::<(), quay_client::ClientError>(())
//! ```

pub mod client;
pub mod config;
pub mod error;

pub use client::{Client, Enqueued, PROTOCOL_VERSION};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};

pub use quay_core::{
    CanonicalJob, JobRequest, Outcome, PlanId, PlannedJob, RecurrenceInterval, UniqueDescriptor,
};
pub use quay_infra::{Batch, ProtocolError, UniqueState, UniqueTracker};

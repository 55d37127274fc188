//! Identifier generation and optimistic collision retry.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ProtocolError, ProtocolResult};

/// Source of the random parts of protocol identifiers.
pub trait IdGenerator: Send + Sync {
    /// Token for a generated plan id (the part after `<source>_`).
    fn plan_token(&self) -> String;

    /// Random tail of a batch id (`<source>:<name>:<suffix>`).
    fn batch_suffix(&self) -> String;

    /// Id of an unassigned queue entry.
    fn entry_id(&self) -> String;
}

/// Time-derived and UUID-based ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIds;

impl IdGenerator for SystemIds {
    fn plan_token(&self) -> String {
        let now = Utc::now();
        let tail = Uuid::new_v4().simple().to_string();
        format!(
            "{}.{:06}{}",
            now.timestamp(),
            now.timestamp_subsec_micros(),
            &tail[..4]
        )
    }

    fn batch_suffix(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        id[id.len() - 8..].to_string()
    }

    fn entry_id(&self) -> String {
        Uuid::now_v7().simple().to_string()
    }
}

/// Replays queued ids, then falls back to [`SystemIds`].
///
/// Lets tests force identifier collisions.
#[derive(Debug, Default)]
pub struct FixedIds {
    plan_tokens: Mutex<VecDeque<String>>,
    batch_suffixes: Mutex<VecDeque<String>>,
    entry_ids: Mutex<VecDeque<String>>,
}

impl FixedIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan_tokens<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&self.plan_tokens, tokens);
        self
    }

    pub fn with_batch_suffixes<I, S>(self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&self.batch_suffixes, suffixes);
        self
    }

    pub fn with_entry_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&self.entry_ids, ids);
        self
    }
}

fn extend<I, S>(queue: &Mutex<VecDeque<String>>, items: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .extend(items.into_iter().map(Into::into));
}

fn next(queue: &Mutex<VecDeque<String>>) -> Option<String> {
    queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
}

impl IdGenerator for FixedIds {
    fn plan_token(&self) -> String {
        next(&self.plan_tokens).unwrap_or_else(|| SystemIds.plan_token())
    }

    fn batch_suffix(&self) -> String {
        next(&self.batch_suffixes).unwrap_or_else(|| SystemIds.batch_suffix())
    }

    fn entry_id(&self) -> String {
        next(&self.entry_ids).unwrap_or_else(|| SystemIds.entry_id())
    }
}

/// Run `attempt` until it yields a value, at most `max_attempts` times.
///
/// `Ok(None)` from `attempt` means "identifier taken, try another one".
/// Errors end the loop immediately.
pub fn retry_on_collision<T>(
    max_attempts: u32,
    what: &'static str,
    mut attempt: impl FnMut(u32) -> ProtocolResult<Option<T>>,
) -> ProtocolResult<T> {
    let max_attempts = max_attempts.max(1);
    for n in 1..=max_attempts {
        if let Some(value) = attempt(n)? {
            return Ok(value);
        }
        debug!(what, attempt = n, "Identifier collision, retrying with a fresh id");
    }

    Err(ProtocolError::IdCollisionLimit {
        what,
        attempts: max_attempts,
    })
}

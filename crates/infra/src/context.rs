use std::fmt;
use std::sync::Arc;

use crate::backend::{Backend, InMemoryBackend};
use crate::ids::{IdGenerator, SystemIds};

/// Default bound for identifier collision retries.
pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 64;

/// Shared handles every protocol component works against.
///
/// Cheap to clone; components hold their own copy instead of reaching for
/// process-wide state.
#[derive(Clone)]
pub struct Context {
    backend: Arc<dyn Backend>,
    ids: Arc<dyn IdGenerator>,
    max_id_attempts: u32,
}

impl Context {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            ids: Arc::new(SystemIds),
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
        }
    }

    /// Context over a fresh [`InMemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// Same ids and limits over another store.
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts.max(1);
        self
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    pub fn max_id_attempts(&self) -> u32 {
        self.max_id_attempts
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("max_id_attempts", &self.max_id_attempts)
            .finish_non_exhaustive()
    }
}

//! Source-scoped plan identifiers.

use core::fmt;

use crate::error::EnvelopeError;

/// Externally visible plan identifier, rendered as `<sourceId>_<token>`.
///
/// Source ids may themselves contain underscores, so a raw id can only be
/// split when the expected source is known; see [`PlanId::parse_for`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanId {
    source_id: String,
    token: String,
}

impl PlanId {
    pub fn new(source_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            token: token.into(),
        }
    }

    /// Parse `raw`, requiring it to belong to `source_id`.
    pub fn parse_for(source_id: &str, raw: &str) -> Result<Self, EnvelopeError> {
        raw.strip_prefix(source_id)
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|token| !token.is_empty())
            .map(|token| Self::new(source_id, token))
            .ok_or_else(|| EnvelopeError::invalid_plan_id(source_id, raw))
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.source_id, self.token)
    }
}

//! Envelope error model.

use thiserror::Error;

/// Result type used by envelope construction and decoding.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// A stored or incoming payload could not be turned into a protocol value.
///
/// Every variant is a flavour of "malformed envelope"; callers that only care
/// about the category can match on the whole enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The bytes were not valid JSON.
    #[error("malformed envelope: invalid json: {0}")]
    InvalidJson(String),

    /// The JSON document was not an object.
    #[error("malformed envelope: expected a json object")]
    NotAnObject,

    /// A mandatory field was absent (or null).
    #[error("malformed envelope: missing field `{0}`")]
    MissingField(&'static str),

    /// A field was present with the wrong shape.
    #[error("malformed envelope: field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// A recurrence interval could not be parsed.
    #[error("invalid recurrence interval `{0}`")]
    InvalidInterval(String),

    /// A zero-length recurrence interval can never advance.
    #[error("recurrence interval must be longer than zero")]
    ZeroInterval,

    /// Advancing a timestamp left the representable date range.
    #[error("recurrence overflowed the supported date range")]
    IntervalOverflow,

    /// A plan identifier did not match `<sourceId>_<token>`.
    #[error("invalid plan id `{id}` for source `{source_id}`")]
    InvalidPlanId { source_id: String, id: String },
}

impl EnvelopeError {
    pub fn invalid_field(field: &'static str, expected: &'static str) -> Self {
        Self::InvalidField { field, expected }
    }

    pub fn invalid_plan_id(source_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self::InvalidPlanId {
            source_id: source_id.into(),
            id: id.into(),
        }
    }
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidJson(value.to_string())
    }
}

//! Entry pushed onto an unassigned queue.
//!
//! `id` and `queue_time` are the names consumers read; keep them as they are.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::job::{CanonicalJob, decode_object, normalize_job_fields};

/// A canonical job plus the id and time it was queued.
///
/// Serialized as the job's sparse map merged with `id` and `queue_time`
/// (fractional epoch seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedEntry {
    #[serde(flatten)]
    job: CanonicalJob,
    id: String,
    queue_time: f64,
}

impl UnassignedEntry {
    pub fn new(job: CanonicalJob, id: impl Into<String>, queue_time: f64) -> Self {
        Self {
            job,
            id: id.into(),
            queue_time,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> EnvelopeResult<Self> {
        let mut map = decode_object(bytes)?;
        normalize_job_fields(&mut map)?;

        match map.get("id") {
            Some(JsonValue::String(_)) => {}
            Some(_) => return Err(EnvelopeError::invalid_field("id", "a string")),
            None => return Err(EnvelopeError::MissingField("id")),
        }
        match map.get("queue_time") {
            Some(JsonValue::Number(_)) => {}
            Some(_) => return Err(EnvelopeError::invalid_field("queue_time", "a number")),
            None => return Err(EnvelopeError::MissingField("queue_time")),
        }

        Ok(serde_json::from_value(JsonValue::Object(map))?)
    }

    pub fn to_json_string(&self) -> EnvelopeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue_time(&self) -> f64 {
        self.queue_time
    }

    pub fn job(&self) -> &CanonicalJob {
        &self.job
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRequest, UniqueDescriptor};
    use serde_json::json;

    fn entry() -> UnassignedEntry {
        let job = CanonicalJob::from(
            JobRequest::new("Export", "crm", "export")
                .with_args(vec![json!("a")])
                .with_unique(UniqueDescriptor::new("export-1")),
        );
        UnassignedEntry::new(job, "0190a1b2c3d4", 1_700_000_000.25)
    }

    #[test]
    fn merges_job_fields_with_entry_fields() {
        let value: JsonValue = serde_json::from_str(&entry().to_json_string().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "class": "Export",
                "args": ["a"],
                "sourceId": "crm",
                "name": "export",
                "unique": {"uid": "export-1"},
                "id": "0190a1b2c3d4",
                "queue_time": 1_700_000_000.25
            })
        );
    }

    #[test]
    fn decoding_reproduces_the_entry() {
        let entry = entry();
        let decoded = UnassignedEntry::from_bytes(entry.to_json_string().unwrap().as_bytes()).unwrap();

        assert_eq!(decoded, entry);
    }

    #[test]
    fn queue_time_keeps_every_bit() {
        let job = entry().job().clone();
        let entry = UnassignedEntry::new(job, "0190a1b2c3d4", 494_673_850.650_182_84);

        let decoded = UnassignedEntry::from_bytes(entry.to_json_string().unwrap().as_bytes()).unwrap();

        assert_eq!(decoded.queue_time().to_bits(), entry.queue_time().to_bits());
    }

    #[test]
    fn entry_fields_are_mandatory() {
        let err = UnassignedEntry::from_bytes(
            br#"{"class":"Export","sourceId":"crm","name":"export","queue_time":1.0}"#,
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::MissingField("id"));

        let err = UnassignedEntry::from_bytes(
            br#"{"class":"Export","sourceId":"crm","name":"export","id":"x","queue_time":"soon"}"#,
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::invalid_field("queue_time", "a number"));
    }
}

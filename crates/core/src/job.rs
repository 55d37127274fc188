//! Canonical job envelope and the caller-side request it is built from.
//!
//! Serialized field names (`class`, `sourceId`, `unique.uid`, ...) are the
//! ones existing workers decode; renaming any of them breaks consumers.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{EnvelopeError, EnvelopeResult};

/// Deduplication descriptor attached to a job.
///
/// `deferrable_by` is `Some` when a duplicate submission may be parked until
/// the running instance finishes; the delay is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueDescriptor {
    #[serde(rename = "uid")]
    id: String,
    #[serde(
        rename = "deferrableBy",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "clamped_delay"
    )]
    deferrable_by: Option<u64>,
}

impl UniqueDescriptor {
    /// Non-deferrable descriptor.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            deferrable_by: None,
        }
    }

    /// Deferrable descriptor; negative delays are clamped to zero.
    pub fn deferrable(id: impl Into<String>, delay_seconds: i64) -> Self {
        Self {
            id: id.into(),
            deferrable_by: Some(delay_seconds.max(0) as u64),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_deferred(&self) -> bool {
        self.deferrable_by.is_some()
    }

    /// Deferral delay in seconds (zero when not deferrable).
    pub fn deferral_delay(&self) -> u64 {
        self.deferrable_by.unwrap_or(0)
    }
}

fn clamped_delay<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.map(|delay| delay.max(0) as u64))
}

/// What a caller hands to the façade. Fields are copied verbatim into the
/// canonical job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobRequest {
    pub class_name: String,
    pub args: Vec<JsonValue>,
    pub source_id: String,
    pub name: String,
    pub unique: Option<UniqueDescriptor>,
    pub monitored: bool,
    pub include_path: Option<String>,
    pub environment: Option<BTreeMap<String, String>>,
}

impl JobRequest {
    pub fn new(
        class_name: impl Into<String>,
        source_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            source_id: source_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<JsonValue>) -> Self {
        self.args = args;
        self
    }

    pub fn with_unique(mut self, unique: UniqueDescriptor) -> Self {
        self.unique = Some(unique);
        self
    }

    pub fn monitored(mut self) -> Self {
        self.monitored = true;
        self
    }

    pub fn with_include_path(mut self, path: impl Into<String>) -> Self {
        self.include_path = Some(path.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Normalized, store-serializable job.
///
/// Serialization is sparse: empty `args`, `false` monitoring and absent
/// optionals are left out, so decoding the output yields an equal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalJob {
    #[serde(rename = "class")]
    class_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<JsonValue>,
    source_id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unique: Option<UniqueDescriptor>,
    #[serde(default, skip_serializing_if = "is_false")]
    is_monitored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    include_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    environment: Option<BTreeMap<String, String>>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl CanonicalJob {
    pub fn from_request(request: &JobRequest) -> Self {
        Self {
            class_name: request.class_name.clone(),
            args: request.args.clone(),
            source_id: request.source_id.clone(),
            name: request.name.clone(),
            unique: request.unique.clone(),
            is_monitored: request.monitored,
            include_path: request.include_path.clone(),
            environment: request.environment.clone(),
        }
    }

    /// Decode a stored payload, checking mandatory fields and the shape of
    /// `args`.
    pub fn from_bytes(bytes: &[u8]) -> EnvelopeResult<Self> {
        let mut map = decode_object(bytes)?;
        normalize_job_fields(&mut map)?;
        Ok(serde_json::from_value(JsonValue::Object(map))?)
    }

    pub fn to_value(&self) -> EnvelopeResult<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_string(&self) -> EnvelopeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn args(&self) -> &[JsonValue] {
        &self.args
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique(&self) -> Option<&UniqueDescriptor> {
        self.unique.as_ref()
    }

    /// Unique id, if the job carries a non-empty one.
    pub fn unique_id(&self) -> Option<&str> {
        self.unique
            .as_ref()
            .map(UniqueDescriptor::id)
            .filter(|id| !id.is_empty())
    }

    pub fn is_monitored(&self) -> bool {
        self.is_monitored
    }

    pub fn include_path(&self) -> Option<&str> {
        self.include_path.as_deref()
    }

    pub fn environment(&self) -> Option<&BTreeMap<String, String>> {
        self.environment.as_ref()
    }
}

impl From<&JobRequest> for CanonicalJob {
    fn from(request: &JobRequest) -> Self {
        Self::from_request(request)
    }
}

impl From<JobRequest> for CanonicalJob {
    fn from(request: JobRequest) -> Self {
        Self {
            class_name: request.class_name,
            args: request.args,
            source_id: request.source_id,
            name: request.name,
            unique: request.unique,
            is_monitored: request.monitored,
            include_path: request.include_path,
            environment: request.environment,
        }
    }
}

pub(crate) fn decode_object(bytes: &[u8]) -> EnvelopeResult<Map<String, JsonValue>> {
    match serde_json::from_slice::<JsonValue>(bytes)? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(EnvelopeError::NotAnObject),
    }
}

/// Validate the job part of a stored object and drop what decodes as "absent".
///
/// Null fields count as absent. A `unique` member without a string `uid` is
/// ignored rather than rejected; consumers have always treated it that way.
pub(crate) fn normalize_job_fields(map: &mut Map<String, JsonValue>) -> EnvelopeResult<()> {
    map.retain(|_, value| !value.is_null());

    for field in ["class", "sourceId", "name"] {
        match map.get(field) {
            None => return Err(EnvelopeError::MissingField(field)),
            Some(JsonValue::String(_)) => {}
            Some(_) => return Err(EnvelopeError::invalid_field(field, "a string")),
        }
    }

    if let Some(args) = map.get("args") {
        if !args.is_array() {
            return Err(EnvelopeError::invalid_field("args", "a list"));
        }
    }

    let unique_is_usable = map
        .get("unique")
        .and_then(JsonValue::as_object)
        .is_some_and(|unique| unique.get("uid").is_some_and(JsonValue::is_string));
    if !unique_is_usable {
        map.remove("unique");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_request() -> JobRequest {
        JobRequest::new("App\\Jobs\\Export", "crm", "export")
            .with_args(vec![json!(1), json!({"format": "csv"})])
            .with_unique(UniqueDescriptor::deferrable("export-1", 30))
            .monitored()
            .with_include_path("/srv/app")
            .with_env("APP_ENV", "prod")
    }

    #[test]
    fn request_fields_are_copied_verbatim() {
        let request = sample_request();
        let job = CanonicalJob::from_request(&request);

        assert_eq!(job.class_name(), "App\\Jobs\\Export");
        assert_eq!(job.source_id(), "crm");
        assert_eq!(job.name(), "export");
        assert_eq!(job.args(), request.args.as_slice());
        assert_eq!(job.unique_id(), Some("export-1"));
        assert!(job.is_monitored());
        assert_eq!(job.include_path(), Some("/srv/app"));
        assert_eq!(
            job.environment().and_then(|env| env.get("APP_ENV")).map(String::as_str),
            Some("prod")
        );
        assert_eq!(CanonicalJob::from(request), job);
    }

    #[test]
    fn serialization_is_sparse() {
        let job = CanonicalJob::from(JobRequest::new("Ping", "crm", "ping"));
        let value = job.to_value().unwrap();

        assert_eq!(value, json!({"class": "Ping", "sourceId": "crm", "name": "ping"}));
    }

    #[test]
    fn full_job_uses_wire_names() {
        let value = CanonicalJob::from(sample_request()).to_value().unwrap();

        assert_eq!(
            value,
            json!({
                "class": "App\\Jobs\\Export",
                "args": [1, {"format": "csv"}],
                "sourceId": "crm",
                "name": "export",
                "unique": {"uid": "export-1", "deferrableBy": 30},
                "isMonitored": true,
                "includePath": "/srv/app",
                "environment": {"APP_ENV": "prod"}
            })
        );
    }

    #[test]
    fn decoding_reproduces_the_encoded_job() {
        let job = CanonicalJob::from(sample_request());
        let bytes = job.to_json_string().unwrap();

        assert_eq!(CanonicalJob::from_bytes(bytes.as_bytes()).unwrap(), job);
    }

    #[test]
    fn empty_optionals_survive_a_round_trip() {
        let mut request = JobRequest::new("Ping", "crm", "ping").with_include_path("");
        request.environment = Some(BTreeMap::new());
        let job = CanonicalJob::from(request);

        let decoded = CanonicalJob::from_bytes(job.to_json_string().unwrap().as_bytes()).unwrap();
        assert_eq!(decoded, job);
        assert_eq!(decoded.include_path(), Some(""));
    }

    #[test]
    fn missing_mandatory_fields_are_rejected() {
        let err = CanonicalJob::from_bytes(br#"{"class":"Ping","name":"ping"}"#).unwrap_err();
        assert_eq!(err, EnvelopeError::MissingField("sourceId"));

        let err = CanonicalJob::from_bytes(br#"{"class":null,"sourceId":"crm","name":"ping"}"#)
            .unwrap_err();
        assert_eq!(err, EnvelopeError::MissingField("class"));
    }

    #[test]
    fn non_list_args_are_rejected() {
        let err = CanonicalJob::from_bytes(
            br#"{"class":"Ping","sourceId":"crm","name":"ping","args":{"a":1}}"#,
        )
        .unwrap_err();

        assert_eq!(err, EnvelopeError::invalid_field("args", "a list"));
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        assert_eq!(CanonicalJob::from_bytes(b"[1,2]").unwrap_err(), EnvelopeError::NotAnObject);
        assert!(matches!(
            CanonicalJob::from_bytes(b"{not json").unwrap_err(),
            EnvelopeError::InvalidJson(_)
        ));
    }

    #[test]
    fn unique_without_uid_is_ignored() {
        let job = CanonicalJob::from_bytes(
            br#"{"class":"Ping","sourceId":"crm","name":"ping","unique":{"deferrableBy":5}}"#,
        )
        .unwrap();

        assert!(job.unique().is_none());
    }

    #[test]
    fn negative_deferral_delay_is_clamped() {
        let job = CanonicalJob::from_bytes(
            br#"{"class":"Ping","sourceId":"crm","name":"ping","unique":{"uid":"u","deferrableBy":-4}}"#,
        )
        .unwrap();
        let unique = job.unique().unwrap();

        assert!(unique.is_deferred());
        assert_eq!(unique.deferral_delay(), 0);
        assert_eq!(UniqueDescriptor::deferrable("u", -4), *unique);
        assert!(!UniqueDescriptor::new("u").is_deferred());
    }
}

//! End-to-end façade behaviour over the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use quay_client::{
    CanonicalJob, Client, ClientConfig, ClientError, Enqueued, JobRequest, ProtocolError,
    RecurrenceInterval, UniqueDescriptor, UniqueState,
};
use quay_core::{UnassignedEntry, keys};
use quay_infra::{Backend, FixedIds, InMemoryBackend};
use serde_json::json;

fn client() -> (Client, Arc<InMemoryBackend>) {
    quay_observability::init_for_tests();
    let backend = InMemoryBackend::arc();
    let client = Client::with_backend(backend.clone(), ClientConfig::default());
    (client, backend)
}

fn mail(uid: Option<UniqueDescriptor>) -> JobRequest {
    let request = JobRequest::new("Mailer", "crm", "send").with_args(vec![json!({"to": "ops"})]);
    match uid {
        Some(uid) => request.with_unique(uid),
        None => request,
    }
}

fn protocol(err: ClientError) -> ProtocolError {
    err.protocol()
        .cloned()
        .unwrap_or_else(|| panic!("expected protocol error, got {err:?}"))
}

#[test]
fn enqueue_pushes_an_unassigned_entry() {
    let (client, backend) = client();

    let outcome = client.enqueue(mail(None)).unwrap();

    let id = outcome.id().unwrap().to_string();
    let stored = backend.lrange("unassigned:crm:send").unwrap();
    let entry = UnassignedEntry::from_bytes(stored[0].as_bytes()).unwrap();
    assert_eq!(entry.id(), id);
    assert_eq!(entry.job(), &CanonicalJob::from(mail(None)));
    assert_eq!(backend.smembers("unassigned").unwrap(), vec!["crm:send"]);
}

#[test]
fn unique_jobs_are_admitted_once() {
    let (client, backend) = client();
    let request = mail(Some(UniqueDescriptor::new("weekly-digest")));

    client.enqueue(request.clone()).unwrap();
    let err = protocol(client.enqueue(request).unwrap_err());

    assert!(matches!(err, ProtocolError::DuplicateUnique { unique_id } if unique_id == "weekly-digest"));
    assert_eq!(backend.llen("unassigned:crm:send").unwrap(), 1);
}

#[test]
fn deferrable_duplicate_is_parked_while_running() {
    let (client, backend) = client();
    let request = mail(Some(UniqueDescriptor::deferrable("sync", 10)));

    client.enqueue(request.clone()).unwrap();
    // A worker picked it up.
    assert!(client.unique().transition_state("sync", UniqueState::Running).unwrap());

    assert!(client.enqueue(request.clone()).unwrap().is_deferred());
    // The slot is taken, so a second deferral is a plain duplicate.
    let err = protocol(client.enqueue_delayed(30, request.clone()).unwrap_err());
    assert!(matches!(err, ProtocolError::DuplicateUnique { .. }));

    assert_eq!(backend.llen("unassigned:crm:send").unwrap(), 1);
    assert_eq!(
        client.unique().deferred_job("sync").unwrap(),
        Some(CanonicalJob::from(request))
    );
}

#[test]
fn failed_push_releases_the_unique_id() {
    let (client, backend) = client();
    let request = mail(Some(UniqueDescriptor::new("nightly")));
    // Queue key holds a string, so the push fails with WRONGTYPE.
    backend.set("unassigned:crm:send", "occupied").unwrap();

    let err = protocol(client.enqueue(request.clone()).unwrap_err());

    assert!(matches!(err, ProtocolError::StoreUnavailable(_)));
    assert_eq!(client.unique().state("nightly").unwrap(), None);

    backend.del("unassigned:crm:send").unwrap();
    assert!(matches!(client.enqueue(request).unwrap(), Enqueued::Queued { .. }));
    assert_eq!(client.unique().state("nightly").unwrap(), Some(UniqueState::Queued));
}

#[test]
fn failed_delayed_push_releases_the_unique_id() {
    let (client, backend) = client();
    backend.set("delayed_queue_schedule", "occupied").unwrap();

    let err = protocol(
        client
            .enqueue_delayed(30, mail(Some(UniqueDescriptor::new("nightly"))))
            .unwrap_err(),
    );

    assert!(matches!(err, ProtocolError::StoreUnavailable(_)));
    assert_eq!(client.unique().state("nightly").unwrap(), None);
}

#[test]
fn delayed_jobs_land_in_their_bucket() {
    let (client, backend) = client();

    let Enqueued::Delayed { at } = client.enqueue_delayed(60, mail(None)).unwrap() else {
        panic!("expected a delayed job");
    };

    assert_eq!(backend.llen(&keys::delayed(at)).unwrap(), 1);
    assert!(backend.zscore("delayed_queue_schedule", &at.to_string()).unwrap().is_some());
}

#[test]
fn batch_lifecycle() {
    let (client, backend) = client();
    let mut batch = client.create_batch(600);

    batch.push(mail(None)).unwrap();
    batch.push(mail(None)).unwrap();
    let id = batch.commit().unwrap();

    assert_eq!(backend.llen(&keys::batch_committed(&id)).unwrap(), 2);
    assert!(client.load_batch(&id).unwrap().unwrap().is_committed());
    assert!(client.load_batch("crm:send:missing").unwrap().is_none());

    assert!(matches!(batch.push(mail(None)), Err(ProtocolError::BatchAlreadyCommitted)));
    assert!(matches!(batch.commit(), Err(ProtocolError::BatchCommitFailed)));
}

#[test]
fn default_batch_uses_configured_ttl() {
    quay_observability::init_for_tests();
    let backend = InMemoryBackend::arc();
    let client = Client::with_backend(backend.clone(), ClientConfig::default().with_default_batch_ttl(90));

    let mut batch = client.batch();
    batch.push(mail(None)).unwrap();

    assert_eq!(batch.ttl(), 90);
    let key = keys::batch_uncommitted(batch.id().unwrap());
    assert_eq!(backend.ttl(&key).unwrap(), Some(90));
}

#[test]
fn plan_round_trip() {
    let (client, backend) = client();
    let next_run = Utc::now() + Duration::days(1);

    let id = client
        .plan_insert(next_run, RecurrenceInterval::days(7), mail(None), Some("weekly"))
        .unwrap();
    assert_eq!(id.to_string(), "crm_weekly");

    let planned = client.plan_get("crm", "crm_weekly").unwrap().unwrap();
    assert_eq!(planned.next_run_timestamp(), next_run.timestamp());
    assert_eq!(planned.recurrence_interval(), RecurrenceInterval::days(7));
    assert_eq!(client.plan_list_ids("crm").unwrap(), vec!["crm_weekly"]);

    let err = protocol(
        client
            .plan_insert(next_run, RecurrenceInterval::days(7), mail(None), Some("weekly"))
            .unwrap_err(),
    );
    assert!(matches!(err, ProtocolError::PlanExists { .. }));

    assert!(client.plan_remove("crm", "crm_weekly").unwrap());
    assert!(!client.plan_remove("crm", "crm_weekly").unwrap());
    assert!(!backend.exists(&keys::plan_timestamp(next_run.timestamp())).unwrap());
    assert!(backend.zscore("plan_schedule", &next_run.timestamp().to_string()).unwrap().is_none());
}

#[test]
fn generated_plan_ids_retry_past_collisions() {
    quay_observability::init_for_tests();
    let ids = FixedIds::new().with_plan_tokens(["1700000000.1", "1700000000.1", "1700000000.2"]);
    let ctx = quay_infra::Context::in_memory().with_ids(Arc::new(ids));
    let client = Client::with_context(ctx, ClientConfig::default());
    let next_run = Utc::now() + Duration::hours(1);

    let first = client.plan_insert(next_run, RecurrenceInterval::hours(1), mail(None), None).unwrap();
    let second = client.plan_insert(next_run, RecurrenceInterval::hours(1), mail(None), None).unwrap();

    assert_eq!(first.to_string(), "crm_1700000000.1");
    assert_eq!(second.to_string(), "crm_1700000000.2");
}

#[test]
fn set_backend_normalizes_the_server_address() {
    let (mut client, _) = client();

    client.set_backend("queue.internal:6390").unwrap();

    assert_eq!(client.config().server, "redis://queue.internal:6390");
}

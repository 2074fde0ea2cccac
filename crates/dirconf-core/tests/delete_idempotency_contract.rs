//! Contract Test: Delete Idempotency
//!
//! Constraints verified:
//! - Deleting an object that is already gone succeeds
//! - A vanished object reads as `Absent`, not as an error
//! - Dry run never issues the delete call

mod common;

use common::*;
use dirconf_core::{ReadOutcome, ReconcileEvent, ReconcilerConfig, ResourceIdentity};

#[tokio::test]
async fn delete_twice_succeeds() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("alert-handler", ["ops-mail"]);
    client.put(&id, smtp_handler(true, &["a@x.com"]));

    let (reconciler, mut events) = reconciler(&client, &schemas);

    reconciler.delete(&id).await.unwrap();
    assert!(client.get(&id).is_none());

    // Already gone: still success
    reconciler.delete(&id).await.unwrap();
    assert_eq!(client.delete_call_count(), 2);

    let deleted = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ReconcileEvent::Deleted { .. }))
        .count();
    assert_eq!(deleted, 2);
}

#[tokio::test]
async fn vanished_object_reads_as_absent() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("local-db-index", ["userRoot", "cn"]);

    let (reconciler, mut events) = reconciler(&client, &schemas);

    assert_eq!(reconciler.read(&id).await.unwrap(), ReadOutcome::Absent);
    assert_eq!(
        drain_events(&mut events),
        vec![ReconcileEvent::Absent { identity: id }]
    );
}

#[tokio::test]
async fn dry_run_delete_makes_no_call() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("alert-handler", ["ops-mail"]);
    client.put(&id, smtp_handler(true, &["a@x.com"]));

    let (reconciler, _events) = reconciler_with(
        &client,
        &schemas,
        ReconcilerConfig {
            dry_run: true,
            ..Default::default()
        },
    );

    reconciler.delete(&id).await.unwrap();
    assert_eq!(client.delete_call_count(), 0);
    assert!(client.get(&id).is_some());
}

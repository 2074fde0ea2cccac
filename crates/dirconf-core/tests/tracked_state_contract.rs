//! Contract Test: Tracked State Across Runs
//!
//! The reconciler is stateless between calls; the caller persists the
//! observed map it returns and hands it back on the next run.
//!
//! Constraints verified:
//! - A converged resource restored from the state store is not re-patched
//! - Restarting with a file store behaves like a long-lived process
//! - Deleting a resource drops its record

mod common;

use common::*;
use dirconf_core::traits::StateStore;
use dirconf_core::{FileStateStore, MemoryStateStore, ResourceIdentity};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn admin_plan(schemas: &dirconf_core::SchemaRegistry) -> dirconf_core::AttributeMap {
    plan(
        schemas,
        "root-dn-user",
        json!({ "password": "s3cret", "privilege": ["config-read"] }),
    )
}

#[tokio::test]
async fn restored_state_keeps_runs_idempotent() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let store = MemoryStateStore::new();
    let id = ResourceIdentity::new("root-dn-user", ["ops-admin"]);
    let desired = admin_plan(&schemas);

    // First run
    {
        let (reconciler, _events) = reconciler(&client, &schemas);
        let prior = assert_ok!(store.get_observed(&id).await);
        let observed = assert_ok!(reconciler.reconcile(&id, &desired, prior.as_ref()).await);
        assert_ok!(store.set_observed(&id, &observed).await);
    }

    // Second run, fresh reconciler
    {
        let (reconciler, _events) = reconciler(&client, &schemas);
        let prior = assert_ok!(store.get_observed(&id).await);
        assert!(prior.is_some());
        assert_ok!(reconciler.reconcile(&id, &desired, prior.as_ref()).await);
    }

    assert_eq!(client.create_call_count(), 1);
    assert_eq!(client.apply_call_count(), 0);
}

#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("root-dn-user", ["ops-admin"]);
    let desired = admin_plan(&schemas);

    {
        let store = assert_ok!(FileStateStore::new(&path).await);
        let (reconciler, _events) = reconciler(&client, &schemas);
        let observed = assert_ok!(reconciler.reconcile(&id, &desired, None).await);
        assert_ok!(store.set_observed(&id, &observed).await);
        assert_ok!(store.flush().await);
    }

    let store = assert_ok!(FileStateStore::new(&path).await);
    assert_eq!(assert_ok!(store.list_records().await), vec![id.clone()]);

    let (reconciler, _events) = reconciler(&client, &schemas);
    let prior = assert_ok!(store.get_observed(&id).await);
    assert_ok!(reconciler.reconcile(&id, &desired, prior.as_ref()).await);
    assert_eq!(client.apply_call_count(), 0);
}

#[tokio::test]
async fn deleted_resource_drops_its_record() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let store = MemoryStateStore::new();
    let id = ResourceIdentity::new("alert-handler", ["ops-mail"]);
    client.put(&id, smtp_handler(true, &["a@x.com"]));

    let (reconciler, _events) = reconciler(&client, &schemas);
    let observed = match assert_ok!(reconciler.read(&id).await) {
        dirconf_core::ReadOutcome::Observed(observed) => observed,
        other => panic!("expected object, got {:?}", other),
    };
    assert_ok!(store.set_observed(&id, &observed).await);

    assert_ok!(reconciler.delete(&id).await);
    assert_ok!(store.delete_record(&id).await);

    assert!(assert_ok!(store.get_record(&id).await).is_none());
    assert!(store.is_empty().await);

    // A singleton can never be dropped this way
    assert_err!(
        reconciler
            .delete(&ResourceIdentity::singleton("global-configuration"))
            .await
    );
}

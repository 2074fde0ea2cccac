//! Contract Test: Import & Drift Detection
//!
//! Constraints verified:
//! - An imported resource has an empty first diff
//! - Malformed keys fail before any network call
//! - Importing a missing object fails instead of tracking an empty one
//! - Out-of-band changes are reported as the operations restoring the tracked state

mod common;

use common::*;
use dirconf_core::{DriftStatus, Error, PatchOperation, ResourceIdentity};
use serde_json::json;

fn seed_index(client: &InMemoryConfigClient) -> ResourceIdentity {
    let id = ResourceIdentity::new("local-db-index", ["userRoot", "cn"]);
    client.put(
        &id,
        json!({
            "attribute": "cn",
            "indexType": ["equality", "substring"],
            "indexEntryLimit": 4000,
            "primeIndex": false,
        }),
    );
    id
}

#[tokio::test]
async fn imported_resource_has_empty_plan() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = seed_index(&client);
    let (reconciler, _events) = reconciler(&client, &schemas);

    let tracked = reconciler.import("local-db-index", "userRoot/cn").await.unwrap();

    assert_eq!(tracked.identity, id);
    assert_eq!(tracked.identity.external_key(), "userRoot/cn");
    assert_eq!(tracked.plan, tracked.observed);
    assert!(reconciler
        .plan(&id, &tracked.plan, Some(&tracked.observed))
        .unwrap()
        .is_empty());

    // Reconciling the imported plan is a no-op
    reconciler
        .reconcile(&id, &tracked.plan, Some(&tracked.observed))
        .await
        .unwrap();
    assert_eq!(client.apply_call_count(), 0);
    assert_eq!(client.create_call_count(), 0);
}

#[tokio::test]
async fn malformed_keys_are_rejected_before_reading() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    seed_index(&client);
    let (reconciler, _events) = reconciler(&client, &schemas);

    for key in ["userRoot", "userRoot/cn/extra", "/cn", "userRoot/", ""] {
        let err = reconciler.import("local-db-index", key).await.unwrap_err();
        assert!(
            matches!(err, Error::ImportKeyInvalid { .. }),
            "key {:?}: {}",
            key,
            err
        );
    }
    assert_eq!(client.fetch_call_count(), 0);
}

#[tokio::test]
async fn empty_segment_is_named_in_the_error() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let (reconciler, _events) = reconciler(&client, &schemas);

    let err = reconciler.import("local-db-index", "userRoot/").await.unwrap_err();
    assert!(err.to_string().contains("segment 2 is empty"), "{}", err);
}

#[tokio::test]
async fn importing_a_missing_object_fails() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let (reconciler, _events) = reconciler(&client, &schemas);

    let err = reconciler.import("local-db-index", "userRoot/sn").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(client.fetch_call_count(), 1);
}

#[tokio::test]
async fn singletons_import_with_an_empty_key() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    client.put(
        &ResourceIdentity::singleton("root-dn"),
        json!({ "defaultRootPrivilegeName": ["config-read"] }),
    );
    let (reconciler, _events) = reconciler(&client, &schemas);

    let tracked = reconciler.import("root-dn", "").await.unwrap();
    assert_eq!(tracked.identity, ResourceIdentity::singleton("root-dn"));

    let err = reconciler.import("root-dn", "x").await.unwrap_err();
    assert!(matches!(err, Error::ImportKeyInvalid { .. }));
}

#[tokio::test]
async fn unknown_resource_type_is_a_config_error() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let (reconciler, _events) = reconciler(&client, &schemas);

    let err = reconciler.import("no-such-thing", "a").await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(client.fetch_call_count(), 0);
}

#[tokio::test]
async fn drift_is_reported_as_restoring_operations() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = seed_index(&client);
    let (reconciler, _events) = reconciler(&client, &schemas);
    let tracked = reconciler.import("local-db-index", "userRoot/cn").await.unwrap();

    let report = reconciler.detect_drift(&id, &tracked.observed).await.unwrap();
    assert!(report.is_in_sync());

    // Someone adds an index type by hand
    let mut stored = client.get(&id).unwrap();
    stored.insert(
        "indexType".to_string(),
        json!(["equality", "presence", "substring"]),
    );
    client.put(&id, serde_json::Value::Object(stored));

    let report = reconciler.detect_drift(&id, &tracked.observed).await.unwrap();
    assert_eq!(
        report.status,
        DriftStatus::Drifted(vec![PatchOperation::remove("indexType", "presence")])
    );
    // Detection never writes
    assert_eq!(client.apply_call_count(), 0);

    client.remove(&id);
    let report = reconciler.detect_drift(&id, &tracked.observed).await.unwrap();
    assert_eq!(report.status, DriftStatus::Gone);
}

#[test]
fn drift_report_serializes_with_status_tag() {
    let report = dirconf_core::DriftReport {
        identity: ResourceIdentity::new("local-db-index", ["userRoot", "cn"]),
        status: DriftStatus::Gone,
    };
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["status"]["status"], json!("gone"));
}

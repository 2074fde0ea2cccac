//! Contract Test: Diff Idempotence & Normalization
//!
//! Constraints verified:
//! - A converged object produces no operations and no network writes
//! - Set fields are patched element by element, in schema order
//! - Empty string and null are the same value for null-equivalent fields
//!
//! If this test fails, every reconciliation would rewrite the server.

mod common;

use common::*;
use dirconf_core::{AttributeValue, PatchOperation, ResourceIdentity};
use serde_json::json;

fn handler_plan(enabled: bool, recipients: &[&str]) -> serde_json::Value {
    json!({
        "type": "smtp",
        "enabled": enabled,
        "senderAddress": "ds@example.com",
        "recipientAddress": recipients,
        "messageSubject": "Alert %%alert-type%%",
        "messageBody": "%%alert-message%%",
    })
}

#[tokio::test]
async fn scenario_plan_is_replace_then_add() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("alert-handler", ["ops-mail"]);
    client.put(&id, smtp_handler(false, &["a@x.com"]));

    let (reconciler, _events) = reconciler(&client, &schemas);

    let observed = match reconciler.read(&id).await.unwrap() {
        dirconf_core::ReadOutcome::Observed(observed) => observed,
        other => panic!("expected object, got {:?}", other),
    };
    let desired = plan(
        &schemas,
        "alert-handler",
        handler_plan(true, &["a@x.com", "b@x.com"]),
    );

    let operations = reconciler.plan(&id, &desired, Some(&observed)).unwrap();
    assert_eq!(
        operations,
        vec![
            PatchOperation::replace("enabled", true),
            PatchOperation::add("recipientAddress", "b@x.com"),
        ]
    );
}

#[tokio::test]
async fn second_reconcile_is_a_no_op() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("alert-handler", ["ops-mail"]);
    client.put(&id, smtp_handler(false, &["a@x.com"]));

    let (reconciler, _events) = reconciler(&client, &schemas);
    let desired = plan(
        &schemas,
        "alert-handler",
        handler_plan(true, &["a@x.com", "b@x.com"]),
    );

    let first = reconciler.reconcile(&id, &desired, None).await.unwrap();
    assert_eq!(client.apply_call_count(), 1);
    assert_eq!(first.get("enabled"), Some(&AttributeValue::Bool(true)));

    let second = reconciler.reconcile(&id, &desired, Some(&first)).await.unwrap();
    assert_eq!(
        client.apply_call_count(),
        1,
        "Converged object must not be patched again"
    );
    assert_eq!(second, first);

    // Nothing left to do against the freshly converged state
    assert!(reconciler.plan(&id, &desired, Some(&second)).unwrap().is_empty());
}

#[tokio::test]
async fn update_with_empty_diff_makes_no_network_call() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("alert-handler", ["ops-mail"]);
    let (reconciler, _events) = reconciler(&client, &schemas);

    let state = plan(&schemas, "alert-handler", handler_plan(true, &["a@x.com"]))
        .with("asynchronous", false)
        .with("enabledAlertSeverity", AttributeValue::set(["error"]));
    let desired = plan(&schemas, "alert-handler", handler_plan(true, &["a@x.com"]));

    let result = reconciler.update(&id, &desired, &state).await.unwrap();

    assert_eq!(result, state);
    assert_eq!(client.fetch_call_count(), 0);
    assert_eq!(client.apply_call_count(), 0);
}

#[tokio::test]
async fn empty_string_on_server_matches_null_plan() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("alert-handler", ["ops-mail"]);

    // The server reports a cleared description as ""
    let mut stored = smtp_handler(true, &["a@x.com"]);
    stored["description"] = json!("");
    client.put(&id, stored);

    let (reconciler, _events) = reconciler(&client, &schemas);

    let mut desired = handler_plan(true, &["a@x.com"]);
    desired["description"] = serde_json::Value::Null;
    let desired = plan(&schemas, "alert-handler", desired);

    reconciler.reconcile(&id, &desired, None).await.unwrap();
    assert_eq!(client.apply_call_count(), 0);
}

#[tokio::test]
async fn set_order_and_duplicates_on_server_are_ignored() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("alert-handler", ["ops-mail"]);
    client.put(&id, smtp_handler(true, &["b@x.com", "a@x.com", "b@x.com"]));

    let (reconciler, _events) = reconciler(&client, &schemas);
    let desired = plan(
        &schemas,
        "alert-handler",
        handler_plan(true, &["a@x.com", "b@x.com"]),
    );

    reconciler.reconcile(&id, &desired, None).await.unwrap();
    assert_eq!(client.apply_call_count(), 0);
}

#[tokio::test]
async fn list_reorder_is_one_whole_replace() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let id = ResourceIdentity::new("alert-handler", ["script"]);
    client.put(
        &id,
        json!({
            "type": "groovy-scripted",
            "enabled": true,
            "scriptClass": "com.example.Alerts",
            "scriptArgument": ["a=1", "b=2"],
        }),
    );

    let (reconciler, _events) = reconciler(&client, &schemas);
    let desired = plan(
        &schemas,
        "alert-handler",
        json!({
            "type": "groovy-scripted",
            "enabled": true,
            "scriptClass": "com.example.Alerts",
            "scriptArgument": ["b=2", "a=1"],
        }),
    );

    reconciler.reconcile(&id, &desired, None).await.unwrap();

    assert_eq!(
        client.patches(),
        vec![vec![PatchOperation::replace(
            "scriptArgument",
            AttributeValue::list(["b=2", "a=1"])
        )]]
    );
}

#[tokio::test]
async fn event_delivery_never_blocks_reconciliation() {
    let schemas = registry();
    let client = InMemoryConfigClient::new(schemas.clone());
    let first = ResourceIdentity::new("alert-handler", ["ops-mail"]);
    let second = ResourceIdentity::new("alert-handler", ["pager"]);
    client.put(&first, smtp_handler(false, &["a@x.com"]));
    client.put(&second, smtp_handler(false, &["a@x.com"]));
    let desired = plan(&schemas, "alert-handler", handler_plan(true, &["a@x.com"]));

    // A full channel drops events
    let (reconciler, mut events) = reconciler_with(
        &client,
        &schemas,
        dirconf_core::ReconcilerConfig {
            event_channel_capacity: 1,
            ..Default::default()
        },
    );
    reconciler.reconcile(&first, &desired, None).await.unwrap();
    assert_eq!(drain_events(&mut events).len(), 1);

    // So does a receiver nobody listens on any more
    drop(events);
    reconciler.reconcile(&second, &desired, None).await.unwrap();

    assert_eq!(client.apply_call_count(), 2);
    assert_eq!(client.get(&second).unwrap()["enabled"], json!(true));
}

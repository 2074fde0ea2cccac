//! Test doubles and common utilities for contract tests
//!
//! `InMemoryConfigClient` behaves like the configuration API as far as the
//! reconciler can tell: objects are raw JSON, sensitive fields come back
//! masked, patch batches apply atomically, and failures can be injected.

#![allow(dead_code)]

use dirconf_core::error::{Error, Result};
use dirconf_core::normalize::{normalize_plan, value_to_json};
use dirconf_core::{
    AttributeMap, ConfigClient, PatchKind, PatchOperation, ReconcileEvent, Reconciler,
    ReconcilerConfig, RemoteObject, ResourceIdentity, SchemaRegistry,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What the server echoes for sensitive fields
pub const MASK: &str = "";

/// An in-memory configuration API that tracks calls
pub struct InMemoryConfigClient {
    schemas: Arc<SchemaRegistry>,
    /// Stored objects
    objects: Arc<Mutex<HashMap<ResourceIdentity, RemoteObject>>>,
    /// Defaults the server fills in on create, per resource type
    defaults: Arc<Mutex<HashMap<String, RemoteObject>>>,
    /// Call counters
    fetch_call_count: Arc<AtomicUsize>,
    create_call_count: Arc<AtomicUsize>,
    apply_call_count: Arc<AtomicUsize>,
    delete_call_count: Arc<AtomicUsize>,
    /// Every batch submitted, in order
    patches: Arc<Mutex<Vec<Vec<PatchOperation>>>>,
    /// Seeds of every create call
    seeds: Arc<Mutex<Vec<RemoteObject>>>,
    /// Reject the next batch with this message
    fail_next_apply: Arc<Mutex<Option<String>>>,
    /// Cancel this token once a batch has applied
    cancel_after_apply: Arc<Mutex<Option<CancellationToken>>>,
}

impl InMemoryConfigClient {
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            schemas,
            objects: Arc::new(Mutex::new(HashMap::new())),
            defaults: Arc::new(Mutex::new(HashMap::new())),
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
            create_call_count: Arc::new(AtomicUsize::new(0)),
            apply_call_count: Arc::new(AtomicUsize::new(0)),
            delete_call_count: Arc::new(AtomicUsize::new(0)),
            patches: Arc::new(Mutex::new(Vec::new())),
            seeds: Arc::new(Mutex::new(Vec::new())),
            fail_next_apply: Arc::new(Mutex::new(None)),
            cancel_after_apply: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a new client that shares objects and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            schemas: Arc::clone(&other.schemas),
            objects: Arc::clone(&other.objects),
            defaults: Arc::clone(&other.defaults),
            fetch_call_count: Arc::clone(&other.fetch_call_count),
            create_call_count: Arc::clone(&other.create_call_count),
            apply_call_count: Arc::clone(&other.apply_call_count),
            delete_call_count: Arc::clone(&other.delete_call_count),
            patches: Arc::clone(&other.patches),
            seeds: Arc::clone(&other.seeds),
            fail_next_apply: Arc::clone(&other.fail_next_apply),
            cancel_after_apply: Arc::clone(&other.cancel_after_apply),
        }
    }

    /// Store an object as the server would hold it
    pub fn put(&self, identity: &ResourceIdentity, object: Value) {
        self.objects
            .lock()
            .unwrap()
            .insert(identity.clone(), as_object(object));
    }

    /// The object as stored (unmasked)
    pub fn get(&self, identity: &ResourceIdentity) -> Option<RemoteObject> {
        self.objects.lock().unwrap().get(identity).cloned()
    }

    pub fn remove(&self, identity: &ResourceIdentity) {
        self.objects.lock().unwrap().remove(identity);
    }

    /// Fill these fields on create when the seed leaves them out
    pub fn set_defaults(&self, resource_type: &str, defaults: Value) {
        self.defaults
            .lock()
            .unwrap()
            .insert(resource_type.to_string(), as_object(defaults));
    }

    pub fn fail_next_apply(&self, message: &str) {
        *self.fail_next_apply.lock().unwrap() = Some(message.to_string());
    }

    pub fn cancel_after_apply(&self, token: CancellationToken) {
        *self.cancel_after_apply.lock().unwrap() = Some(token);
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    pub fn create_call_count(&self) -> usize {
        self.create_call_count.load(Ordering::SeqCst)
    }

    pub fn apply_call_count(&self) -> usize {
        self.apply_call_count.load(Ordering::SeqCst)
    }

    pub fn delete_call_count(&self) -> usize {
        self.delete_call_count.load(Ordering::SeqCst)
    }

    /// Every batch submitted so far
    pub fn patches(&self) -> Vec<Vec<PatchOperation>> {
        self.patches.lock().unwrap().clone()
    }

    /// Every create seed submitted so far
    pub fn seeds(&self) -> Vec<RemoteObject> {
        self.seeds.lock().unwrap().clone()
    }

    fn masked(&self, identity: &ResourceIdentity, mut object: RemoteObject) -> RemoteObject {
        if let Ok(schema) = self.schemas.schema(identity.resource_type()) {
            for (name, value) in object.iter_mut() {
                if schema.field(name).is_some_and(|f| f.sensitive) {
                    *value = Value::String(MASK.to_string());
                }
            }
        }
        object
    }
}

#[async_trait::async_trait]
impl ConfigClient for InMemoryConfigClient {
    async fn fetch_object(&self, identity: &ResourceIdentity) -> Result<Option<RemoteObject>> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        let object = self.objects.lock().unwrap().get(identity).cloned();
        Ok(object.map(|o| self.masked(identity, o)))
    }

    async fn create_object(
        &self,
        identity: &ResourceIdentity,
        seed: &RemoteObject,
    ) -> Result<RemoteObject> {
        self.create_call_count.fetch_add(1, Ordering::SeqCst);
        self.seeds.lock().unwrap().push(seed.clone());

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(identity) {
            return Err(Error::rejected(format!("{} already exists", identity)));
        }

        let mut object = seed.clone();
        if let Some(defaults) = self.defaults.lock().unwrap().get(identity.resource_type()) {
            for (name, value) in defaults {
                object.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
        objects.insert(identity.clone(), object.clone());
        Ok(self.masked(identity, object))
    }

    async fn apply_patch(
        &self,
        identity: &ResourceIdentity,
        operations: &[PatchOperation],
    ) -> Result<RemoteObject> {
        self.apply_call_count.fetch_add(1, Ordering::SeqCst);
        self.patches.lock().unwrap().push(operations.to_vec());

        if let Some(message) = self.fail_next_apply.lock().unwrap().take() {
            return Err(Error::rejected(message));
        }

        let object = {
            let mut objects = self.objects.lock().unwrap();
            let object = objects
                .get_mut(identity)
                .ok_or_else(|| Error::remote_missing(identity.to_string()))?;
            for op in operations {
                apply_to_json(object, op);
            }
            object.clone()
        };

        if let Some(token) = self.cancel_after_apply.lock().unwrap().take() {
            token.cancel();
        }
        Ok(self.masked(identity, object))
    }

    async fn delete_object(&self, identity: &ResourceIdentity) -> Result<()> {
        self.delete_call_count.fetch_add(1, Ordering::SeqCst);
        match self.objects.lock().unwrap().remove(identity) {
            Some(_) => Ok(()),
            None => Err(Error::remote_missing(identity.to_string())),
        }
    }

    fn client_name(&self) -> &'static str {
        "in-memory"
    }
}

fn apply_to_json(object: &mut RemoteObject, op: &PatchOperation) {
    match op.kind {
        PatchKind::Replace if op.value.is_null() => {
            object.remove(&op.field);
        }
        PatchKind::Replace => {
            object.insert(op.field.clone(), value_to_json(&op.value));
        }
        PatchKind::Add | PatchKind::Remove => {
            let element = value_to_json(&op.value);
            let entry = object
                .entry(op.field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entry {
                if op.kind == PatchKind::Add {
                    if !items.contains(&element) {
                        items.push(element);
                    }
                } else {
                    items.retain(|item| *item != element);
                }
            }
        }
    }
}

pub fn as_object(value: Value) -> RemoteObject {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Registry holding the built-in catalog
pub fn registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::with_builtin_catalog())
}

/// Normalize a desired-state JSON object for a resource type
pub fn plan(schemas: &SchemaRegistry, resource_type: &str, desired: Value) -> AttributeMap {
    let schema = schemas.schema(resource_type).expect("known resource type");
    normalize_plan(&as_object(desired), &schema).expect("valid plan")
}

/// Reconciler over a client that shares state with `client`
pub fn reconciler(
    client: &InMemoryConfigClient,
    schemas: &Arc<SchemaRegistry>,
) -> (Reconciler, mpsc::Receiver<ReconcileEvent>) {
    reconciler_with(client, schemas, ReconcilerConfig::default())
}

pub fn reconciler_with(
    client: &InMemoryConfigClient,
    schemas: &Arc<SchemaRegistry>,
    config: ReconcilerConfig,
) -> (Reconciler, mpsc::Receiver<ReconcileEvent>) {
    Reconciler::new(
        Box::new(InMemoryConfigClient::sharing_counters_with(client)),
        Arc::clone(schemas),
        config,
    )
    .expect("reconciler construction succeeds")
}

/// Everything emitted so far
pub fn drain_events(rx: &mut mpsc::Receiver<ReconcileEvent>) -> Vec<ReconcileEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// An SMTP alert handler as the server stores it
pub fn smtp_handler(enabled: bool, recipients: &[&str]) -> Value {
    serde_json::json!({
        "type": "smtp",
        "enabled": enabled,
        "asynchronous": false,
        "enabledAlertSeverity": ["error", "fatal"],
        "senderAddress": "ds@example.com",
        "recipientAddress": recipients,
        "messageSubject": "Alert %%alert-type%%",
        "messageBody": "%%alert-message%%",
    })
}

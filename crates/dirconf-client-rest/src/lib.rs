// # REST Configuration Client
//
// This crate provides the `ConfigClient` implementation for the directory
// server's REST configuration API.
//
// ## Implementation Status
//
// - ✅ One HTTP request per client call (GET, POST, PATCH or DELETE)
// - ✅ Full error propagation to the reconciler (status codes mapped to `Error`)
// - ✅ HTTP timeout configured (default 30 seconds)
// - ✅ Polymorphic families: variant sent and recovered through `schemas`
// - ✅ Dry-run mode for safe testing
// - ❌ NO retry logic (a rejected batch goes back to the reconciler)
// - ❌ NO caching (tracked state is owned by the caller of `Reconciler`)
// - ❌ NO background tasks
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (Config Client)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS calls to the configured server only
// - ✅ Translate wire envelopes into plain field objects
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic
// - ❌ Decide whether a change is needed (owned by `Reconciler`)
// - ❌ Access the state store
//
// ## Security Requirements
//
// - The password NEVER appears in logs or `Debug` output
// - Values of sensitive fields are redacted in dry-run logs
//
// ## API Reference
//
// - Read:   GET    `/config/{endpoint}`
// - Create: POST   `/config/{collection}`
// - Patch:  PATCH  `/config/{endpoint}` with `{"operations": [...]}`
// - Delete: DELETE `/config/{endpoint}`

use async_trait::async_trait;
use dirconf_core::config::ClientConfig;
use dirconf_core::engine::redact_sensitive;
use dirconf_core::normalize::value_to_json;
use dirconf_core::schema::DISCRIMINATOR;
use dirconf_core::traits::{ConfigClient, ConfigClientFactory};
use dirconf_core::{
    Error, PatchKind, PatchOperation, RemoteObject, ResourceIdentity,
    ResourceSchema, Result, SchemaRegistry,
};
use reqwest::{Method, StatusCode, Url};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Path prefix of the configuration API
const CONFIG_PATH: &str = "config";

/// Prefix of the `schemas` URN naming a polymorphic object's variant
const SCHEMA_URN_PREFIX: &str = "urn:pingidentity:schemas:configuration:2.0";

/// Key under which the server attaches informational messages
const MESSAGES_URN: &str = "urn:pingidentity:schemas:configuration:messages:2.0";

/// Envelope keys that are not configuration fields
const ENVELOPE_KEYS: &[&str] = &["schemas", "meta", "id", "_links", MESSAGES_URN];

/// REST configuration API client
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot. Everything else (planning, convergence,
/// re-reads) is owned by `Reconciler`.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the client will:
/// - Perform all GET requests
/// - Log the intended POST/PATCH/DELETE
/// - **NOT** modify the server
pub struct RestConfigClient {
    /// Server base URL
    base_url: Url,

    /// Basic-auth user
    username: String,

    /// Basic-auth password
    /// ⚠️ NEVER log this value
    password: String,

    /// Schema tables, for endpoints and variant names
    schemas: Arc<SchemaRegistry>,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for RestConfigClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConfigClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl RestConfigClient {
    /// Create a new REST client
    ///
    /// # Parameters
    ///
    /// - `base_url`: Server URL, e.g. `https://ds.example.com:1443`
    /// - `username`, `password`: Basic credentials, passed through verbatim
    /// - `timeout`: Per-request timeout
    /// - `dry_run`: If true, perform GET requests but skip mutations
    /// - `schemas`: Registry resolving identities to endpoints
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
        dry_run: bool,
        schemas: Arc<SchemaRegistry>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid server URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "Server URL cannot carry a path: {}",
                base_url
            )));
        }

        let username = username.into();
        if username.is_empty() {
            return Err(Error::config("Username cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            username,
            password: password.into(),
            schemas,
            client,
            dry_run,
        })
    }

    /// URL of one object
    fn object_url(&self, schema: &ResourceSchema, identity: &ResourceIdentity) -> Result<Url> {
        let segments = endpoint_segments(schema.endpoint(), identity.key())?;
        self.url_for(&segments)
    }

    /// URL of the collection an object is created in
    fn collection_url(&self, schema: &ResourceSchema, identity: &ResourceIdentity) -> Result<Url> {
        let mut segments = endpoint_segments(schema.endpoint(), identity.key())?;
        segments.pop();
        self.url_for(&segments)
    }

    fn url_for(&self, segments: &[String]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config(format!("Server URL cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .push(CONFIG_PATH)
            .extend(segments);
        Ok(url)
    }

    /// Send one request and return the status and body
    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String)> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        Ok((status, text))
    }

    /// Parse a success body into a plain field object
    fn parse_object(&self, schema: &ResourceSchema, text: &str) -> Result<RemoteObject> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::http(format!("Failed to parse response: {}", e)))?;
        match value {
            Value::Object(raw) => Ok(strip_envelope(schema, raw)),
            _ => Err(Error::http("Invalid response format: body is not an object")),
        }
    }
}

#[async_trait]
impl ConfigClient for RestConfigClient {
    /// Read one object
    ///
    /// ```http
    /// GET /config/alert-handlers/ops-mail
    /// Authorization: Basic <credentials>
    /// ```
    async fn fetch_object(&self, identity: &ResourceIdentity) -> Result<Option<RemoteObject>> {
        let schema = self.schemas.schema(identity.resource_type())?;
        let url = self.object_url(&schema, identity)?;

        let (status, text) = self.send(Method::GET, &url, None).await?;
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("{} not found on the server", identity);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        self.parse_object(&schema, &text).map(Some)
    }

    /// Create one object
    ///
    /// ```http
    /// POST /config/alert-handlers
    /// {
    ///   "id": "ops-mail",
    ///   "schemas": ["urn:pingidentity:schemas:configuration:2.0:alert-handler:smtp"],
    ///   "enabled": true
    /// }
    /// ```
    async fn create_object(
        &self,
        identity: &ResourceIdentity,
        seed: &RemoteObject,
    ) -> Result<RemoteObject> {
        let schema = self.schemas.schema(identity.resource_type())?;
        let url = self.collection_url(&schema, identity)?;
        let body = create_body(&schema, identity, seed)?;

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would POST {} to {} with field(s): {}",
                identity,
                url,
                field_names(seed)
            );
            return Ok(seed.clone());
        }

        tracing::info!("Creating {} ({} field(s))", identity, seed.len());
        let (status, text) = self.send(Method::POST, &url, Some(&body)).await?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        self.parse_object(&schema, &text)
    }

    /// Submit one batch
    ///
    /// ```http
    /// PATCH /config/alert-handlers/ops-mail
    /// {
    ///   "operations": [
    ///     { "op": "replace", "path": "enabled", "value": true },
    ///     { "op": "add", "path": "recipientAddress", "value": ["b@x.com"] }
    ///   ]
    /// }
    /// ```
    async fn apply_patch(
        &self,
        identity: &ResourceIdentity,
        operations: &[PatchOperation],
    ) -> Result<RemoteObject> {
        let schema = self.schemas.schema(identity.resource_type())?;
        let url = self.object_url(&schema, identity)?;

        if self.dry_run {
            let redacted: Vec<String> = redact_sensitive(&schema, operations)
                .iter()
                .map(ToString::to_string)
                .collect();
            tracing::info!(
                "[DRY-RUN] Would PATCH {}: {}",
                identity,
                redacted.join("; ")
            );
            return Ok(self.fetch_object(identity).await?.unwrap_or_default());
        }

        let body = patch_body(operations);
        tracing::info!("Patching {} ({} operation(s))", identity, operations.len());
        let (status, text) = self.send(Method::PATCH, &url, Some(&body)).await?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        self.parse_object(&schema, &text)
    }

    /// Delete one object; a missing object counts as deleted
    async fn delete_object(&self, identity: &ResourceIdentity) -> Result<()> {
        let schema = self.schemas.schema(identity.resource_type())?;
        let url = self.object_url(&schema, identity)?;

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would DELETE {}", identity);
            return Ok(());
        }

        let (status, text) = self.send(Method::DELETE, &url, None).await?;
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("{} already absent", identity);
            return Ok(());
        }
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        tracing::info!("Deleted {}", identity);
        Ok(())
    }

    fn client_name(&self) -> &'static str {
        "rest"
    }
}

/// Substitute key segments into an endpoint template
///
/// `"backends/{0}/local-db-indexes/{1}"` with `["userRoot", "cn"]` gives
/// `["backends", "userRoot", "local-db-indexes", "cn"]`. Segments are
/// escaped when pushed onto the URL.
fn endpoint_segments(template: &str, key: &[String]) -> Result<Vec<String>> {
    template
        .split('/')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let Some(index) = part
                .strip_prefix('{')
                .and_then(|p| p.strip_suffix('}'))
            else {
                return Ok(part.to_string());
            };
            let index: usize = index
                .parse()
                .map_err(|_| Error::config(format!("Bad endpoint placeholder '{}'", part)))?;
            key.get(index).cloned().ok_or_else(|| {
                Error::config(format!(
                    "Endpoint '{}' needs key segment {}, got {}",
                    template,
                    index,
                    key.len()
                ))
            })
        })
        .collect()
}

/// Build the POST body for a create
fn create_body(
    schema: &ResourceSchema,
    identity: &ResourceIdentity,
    seed: &RemoteObject,
) -> Result<Value> {
    let mut body = seed.clone();

    if let Some(id) = identity.local_id() {
        body.insert("id".to_string(), Value::String(id.to_string()));
    }

    if schema.is_polymorphic() {
        let variant = match body.remove(DISCRIMINATOR) {
            Some(Value::String(variant)) => variant,
            _ => {
                return Err(Error::schema_violation(
                    schema.name(),
                    DISCRIMINATOR,
                    "a type is required to create this resource",
                ));
            }
        };
        body.insert(
            "schemas".to_string(),
            json!([format!("{}:{}:{}", SCHEMA_URN_PREFIX, schema.name(), variant)]),
        );
    }

    Ok(Value::Object(body))
}

/// Build the PATCH body for a batch
fn patch_body(operations: &[PatchOperation]) -> Value {
    let operations: Vec<Value> = operations
        .iter()
        .map(|op| match op.kind {
            PatchKind::Replace if op.value.is_null() => json!({
                "op": "remove",
                "path": op.field,
            }),
            PatchKind::Replace => json!({
                "op": "replace",
                "path": op.field,
                "value": value_to_json(&op.value),
            }),
            PatchKind::Add | PatchKind::Remove => json!({
                "op": if op.kind == PatchKind::Add { "add" } else { "remove" },
                "path": op.field,
                "value": [value_to_json(&op.value)],
            }),
        })
        .collect();

    json!({ "operations": operations })
}

/// Turn a response object into the field object the schema describes
///
/// Envelope keys are dropped and the variant is recovered from `schemas`.
/// Every other attribute is kept, so one the catalog does not model fails
/// normalization instead of vanishing.
fn strip_envelope(schema: &ResourceSchema, mut raw: Map<String, Value>) -> RemoteObject {
    let variant = if schema.is_polymorphic() {
        variant_from_schemas(schema, raw.get("schemas"))
    } else {
        None
    };

    for key in ENVELOPE_KEYS {
        raw.remove(*key);
    }
    if let Some(variant) = variant {
        raw.insert(DISCRIMINATOR.to_string(), Value::String(variant));
    }

    raw
}

fn variant_from_schemas(schema: &ResourceSchema, schemas: Option<&Value>) -> Option<String> {
    let prefix = format!("{}:{}:", SCHEMA_URN_PREFIX, schema.name());
    schemas?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .find_map(|urn| urn.strip_prefix(&prefix))
        .map(str::to_string)
}

/// Map an unsuccessful status to an error
fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = error_detail(body);
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Invalid credentials or insufficient privileges. Status: {}",
            status
        )),
        404 => Error::remote_missing(detail),
        400 | 409 | 422 => Error::rejected(format!("{} - {}", status, detail)),
        429 => Error::http(format!("Rate limit exceeded. Status: {}", status)),
        500..=599 => Error::http(format!("Server error (transient): {} - {}", status, detail)),
        _ => Error::http(format!("Unexpected response: {} - {}", status, detail)),
    }
}

/// The server's `detail` message when the body carries one
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn field_names(object: &RemoteObject) -> String {
    object.keys().cloned().collect::<Vec<_>>().join(", ")
}

/// Factory for creating REST clients
pub struct RestClientFactory;

impl ConfigClientFactory for RestClientFactory {
    fn create(
        &self,
        config: &ClientConfig,
        schemas: Arc<SchemaRegistry>,
    ) -> Result<Box<dyn ConfigClient>> {
        match config {
            ClientConfig::Rest {
                base_url,
                username,
                password,
                timeout_secs,
                dry_run,
            } => {
                config.validate()?;

                if *dry_run {
                    tracing::warn!("REST client running in DRY-RUN mode - no changes will be made");
                }

                Ok(Box::new(RestConfigClient::new(
                    base_url,
                    username.clone(),
                    password.clone(),
                    Duration::from_secs(*timeout_secs),
                    *dry_run,
                    schemas,
                )?))
            }
            _ => Err(Error::config("Invalid config for REST client")),
        }
    }
}

/// Register the REST client with a registry
///
/// # Example
///
/// ```rust
/// use dirconf_core::SchemaRegistry;
///
/// let registry = SchemaRegistry::with_builtin_catalog();
/// dirconf_client_rest::register(&registry);
/// assert!(registry.has_client("rest"));
/// ```
pub fn register(registry: &SchemaRegistry) {
    registry.register_client("rest", Box::new(RestClientFactory));
}

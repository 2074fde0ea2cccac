// # dirconfd - Directory Configuration Driver
//
// ⚠️ ARCHITECTURAL CONSTRAINTS ⚠️
//
// - This is a THIN integration layer ONLY
// - DO NOT add diff, normalization or retry logic here
// - All reconciliation logic MUST be in dirconf-core
// - Configuration is via environment variables ONLY
//
// The dirconfd driver is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime
// 3. Registering the configuration client
// 4. Running plan or apply for every resource of the desired-state document
// 5. Persisting the last observed state of every managed resource
//
// ## Configuration
//
// ### Server
// - `DIRCONF_SERVER_URL`: Base URL of the configuration API
// - `DIRCONF_USERNAME`: Basic-auth user
// - `DIRCONF_PASSWORD`: Basic-auth password
// - `DIRCONF_TIMEOUT_SECS`: Per-request timeout (default 30)
//
// ### Run
// - `DIRCONF_DOCUMENT`: Path of the desired-state JSON document
// - `DIRCONF_MODE`: `plan` (default) or `apply`
//
// ### State Store
// - `DIRCONF_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `DIRCONF_STATE_STORE_PATH`: Path to state file (for file store)
//
// ## Example
//
// ```bash
// export DIRCONF_SERVER_URL=https://ds.example.com:1443
// export DIRCONF_USERNAME="cn=Directory Manager"
// export DIRCONF_PASSWORD=...
// export DIRCONF_DOCUMENT=/etc/dirconf/desired.json
// export DIRCONF_MODE=apply
// export DIRCONF_STATE_STORE_PATH=/var/lib/dirconf/state.json
//
// dirconfd
// ```

use anyhow::Result;
use dirconf_core::config::{
    ClientConfig, DirconfConfig, ReconcilerConfig, RunMode, StateStoreConfig,
};
use dirconf_core::engine::{ReadOutcome, ReconcileEvent, Reconciler, carry_sensitive, redact_sensitive};
use dirconf_core::traits::StateStore;
use dirconf_core::{DesiredDocument, Ensure, Error as CoreError, ResolvedResource, SchemaRegistry};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Every resource planned or converged
/// - 1: Configuration or startup error
/// - 2: Runtime error (at least one resource failed)
#[derive(Debug, Clone, Copy)]
enum DirconfExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DirconfExitCode> for ExitCode {
    fn from(code: DirconfExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    server_url: String,
    username: String,
    password: String,
    timeout_secs: u64,
    document: String,
    mode: String,
    state_store_type: String,
    state_store_path: Option<String>,
    log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("document", &self.document)
            .field("mode", &self.mode)
            .field("state_store_type", &self.state_store_type)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            server_url: env::var("DIRCONF_SERVER_URL").unwrap_or_default(),
            username: env::var("DIRCONF_USERNAME").unwrap_or_default(),
            password: env::var("DIRCONF_PASSWORD")
                .map_err(|_| anyhow::anyhow!("DIRCONF_PASSWORD is required"))?,
            timeout_secs: match env::var("DIRCONF_TIMEOUT_SECS") {
                Ok(s) => s
                    .parse()
                    .map_err(|_| anyhow::anyhow!("DIRCONF_TIMEOUT_SECS must be a number. Got: {}", s))?,
                Err(_) => 30,
            },
            document: env::var("DIRCONF_DOCUMENT").unwrap_or_default(),
            mode: env::var("DIRCONF_MODE").unwrap_or_else(|_| "plan".to_string()),
            state_store_type: env::var("DIRCONF_STATE_STORE_TYPE")
                .unwrap_or_else(|_| "file".to_string()),
            state_store_path: env::var("DIRCONF_STATE_STORE_PATH").ok(),
            log_level: env::var("DIRCONF_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            anyhow::bail!(
                "DIRCONF_SERVER_URL is required. \
                Set it via: export DIRCONF_SERVER_URL=https://ds.example.com:1443"
            );
        }

        if self.username.is_empty() {
            anyhow::bail!("DIRCONF_USERNAME is required");
        }

        if self.document.is_empty() {
            anyhow::bail!(
                "DIRCONF_DOCUMENT is required. \
                Set it via: export DIRCONF_DOCUMENT=/etc/dirconf/desired.json"
            );
        }

        if !(1..=300).contains(&self.timeout_secs) {
            anyhow::bail!(
                "DIRCONF_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                self.timeout_secs
            );
        }

        self.mode.parse::<RunMode>()?;

        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "DIRCONF_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.state_store_type
            ),
        }

        if self.state_store_type == "file" {
            let Some(path) = self.state_store_path.as_deref().filter(|p| !p.is_empty()) else {
                anyhow::bail!(
                    "DIRCONF_STATE_STORE_PATH is required when DIRCONF_STATE_STORE_TYPE=file. \
                    Set it via: export DIRCONF_STATE_STORE_PATH=/var/lib/dirconf/state.json"
                );
            };

            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                anyhow::bail!(
                    "DIRCONF_STATE_STORE_PATH parent directory does not exist: {}. \
                        Create it first: sudo mkdir -p {}",
                    parent.display(),
                    parent.display()
                );
            }
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DIRCONF_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.to_dirconf_config()?.validate()?;
        Ok(())
    }

    /// Library configuration for this run
    fn to_dirconf_config(&self) -> Result<DirconfConfig> {
        let mode: RunMode = self.mode.parse()?;
        let state_store = match self.state_store_type.as_str() {
            "memory" => StateStoreConfig::Memory,
            _ => StateStoreConfig::File {
                path: self.state_store_path.clone().unwrap_or_default(),
            },
        };

        Ok(DirconfConfig {
            client: ClientConfig::Rest {
                base_url: self.server_url.clone(),
                username: self.username.clone(),
                password: self.password.clone(),
                timeout_secs: self.timeout_secs,
                dry_run: false,
            },
            state_store,
            reconciler: ReconcilerConfig::default(),
            mode,
        })
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DirconfExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DirconfExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DirconfExitCode::ConfigError.into();
    }

    info!("Starting dirconfd");
    debug!("Configuration: {:?}", config);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DirconfExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run(config).await {
            Ok(()) => DirconfExitCode::Success,
            Err(e) => {
                error!("Run failed: {}", e);
                DirconfExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run one plan or apply pass over the desired-state document
async fn run(config: Config) -> Result<()> {
    let settings = config.to_dirconf_config()?;

    let registry = Arc::new(SchemaRegistry::with_builtin_catalog());

    #[cfg(feature = "rest")]
    {
        info!("Registering REST configuration client");
        dirconf_client_rest::register(&registry);
    }

    let document = DesiredDocument::load(&config.document).await?;
    let resources = document.resolve(&registry)?;
    info!(
        "Loaded {} resource(s) from {}",
        resources.len(),
        config.document
    );

    let client = registry.create_client(&settings.client)?;
    let state_store = dirconf_core::state::open(&settings.state_store).await?;

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(cancel_on_signal(cancel.clone()));

    let (reconciler, events) =
        Reconciler::new(client, Arc::clone(&registry), settings.reconciler.clone())?;
    let reconciler = reconciler.with_cancellation(cancel.clone());
    let event_logger = tokio::spawn(log_events(events));

    let mut failures = 0usize;
    for resource in &resources {
        let outcome = match settings.mode {
            RunMode::Plan => plan_resource(&reconciler, state_store.as_ref(), resource).await,
            RunMode::Apply => apply_resource(&reconciler, state_store.as_ref(), resource).await,
        };

        match outcome {
            Ok(()) => {}
            Err(CoreError::Cancelled { identity }) => {
                warn!("Cancelled at {}; remaining resources skipped", identity);
                failures += 1;
                break;
            }
            Err(e) => {
                error!("{}", e);
                failures += 1;
            }
        }
    }

    state_store.flush().await?;

    // Dropping the reconciler closes the event channel
    drop(reconciler);
    let _ = event_logger.await;
    signals.abort();

    if failures > 0 {
        anyhow::bail!("{} of {} resource(s) failed", failures, resources.len());
    }

    info!("All {} resource(s) processed", resources.len());
    Ok(())
}

/// Print what an apply would do for one resource
async fn plan_resource(
    reconciler: &Reconciler,
    state_store: &dyn StateStore,
    resource: &ResolvedResource,
) -> dirconf_core::Result<()> {
    let identity = &resource.identity;
    let schema = reconciler.schema(identity)?;

    let observed = match reconciler.read(identity).await? {
        ReadOutcome::Observed(observed) => Some(observed),
        ReadOutcome::Absent => None,
    };

    match (resource.ensure, observed) {
        (Ensure::Absent, Some(_)) => println!("{}: delete", identity),
        (Ensure::Absent, None) => println!("{}: absent, nothing to do", identity),
        (Ensure::Present, observed) => {
            let observed = match (observed, state_store.get_observed(identity).await?) {
                (Some(observed), Some(prior)) => Some(carry_sensitive(&schema, observed, &prior)),
                (observed, _) => observed,
            };
            let verb = if observed.is_some() { "update" } else { "create" };

            let operations = reconciler.plan(identity, &resource.plan, observed.as_ref())?;
            if operations.is_empty() {
                println!("{}: up to date", identity);
                return Ok(());
            }

            println!("{}: {} ({} operation(s))", identity, verb, operations.len());
            for op in redact_sensitive(&schema, &operations) {
                println!("    {}", op);
            }
        }
    }

    Ok(())
}

/// Converge one resource and persist the outcome
async fn apply_resource(
    reconciler: &Reconciler,
    state_store: &dyn StateStore,
    resource: &ResolvedResource,
) -> dirconf_core::Result<()> {
    let identity = &resource.identity;

    match resource.ensure {
        Ensure::Absent => {
            reconciler.delete(identity).await?;
            state_store.delete_record(identity).await?;
        }
        Ensure::Present => {
            let prior = state_store.get_observed(identity).await?;
            let observed = reconciler
                .reconcile(identity, &resource.plan, prior.as_ref())
                .await?;
            state_store.set_observed(identity, &observed).await?;
        }
    }

    Ok(())
}

/// Log reconciler events until the reconciler is dropped
async fn log_events(events: tokio::sync::mpsc::Receiver<ReconcileEvent>) {
    let mut stream = ReceiverStream::new(events);
    while let Some(event) = stream.next().await {
        match event {
            ReconcileEvent::Planned {
                identity,
                operations,
            } => info!("{}: {} operation(s) planned", identity, operations.len()),
            ReconcileEvent::Applying { identity, .. } => debug!("{}: applying", identity),
            ReconcileEvent::Observed { identity } => debug!("{}: observed", identity),
            ReconcileEvent::Absent { identity } => debug!("{}: absent", identity),
            ReconcileEvent::Created { identity } => info!("{}: created", identity),
            ReconcileEvent::Adopted { identity } => info!("{}: adopted", identity),
            ReconcileEvent::Deleted { identity } => info!("{}: deleted", identity),
            ReconcileEvent::ApplyFailed { identity, error } => {
                warn!("{}: apply failed: {}", identity, error)
            }
        }
    }
}

/// Cancel `token` on SIGTERM or SIGINT
///
/// The resource being processed aborts before its next network call;
/// whatever was already applied stays applied.
#[cfg(unix)]
async fn cancel_on_signal(token: CancellationToken) {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to set up signal handlers: {}", e);
            return;
        }
    };

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    warn!("Received {}, cancelling", received);
    token.cancel();
}

/// Cancel `token` on CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn cancel_on_signal(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received SIGINT, cancelling");
            token.cancel();
        }
        Err(e) => warn!("Failed to wait for CTRL-C: {}", e),
    }
}

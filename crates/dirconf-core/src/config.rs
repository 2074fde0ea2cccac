//! Configuration types for the reconciliation engine
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirconfConfig {
    /// Configuration API client
    pub client: ClientConfig,

    /// Tracked-state store
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Reconciler settings
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Plan only, or plan and apply
    #[serde(default)]
    pub mode: RunMode,
}

impl DirconfConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.client.validate()?;
        self.state_store.validate()?;
        self.reconciler.validate()?;
        Ok(())
    }
}

/// Configuration API client configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientConfig {
    /// REST configuration API
    Rest {
        /// Server base URL, e.g. `https://ds.example.com:1443`
        base_url: String,
        /// Basic-auth user
        username: String,
        /// Basic-auth password
        password: String,
        /// Per-request timeout (in seconds)
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        /// Perform reads only; log and skip mutating calls
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom client
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ClientConfig {
    /// REST client configuration with default timeout
    pub fn rest(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        ClientConfig::Rest {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            timeout_secs: default_timeout_secs(),
            dry_run: false,
        }
    }

    /// Validate the client configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ClientConfig::Rest {
                base_url,
                username,
                timeout_secs,
                ..
            } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config("Server URL cannot be empty"));
                }
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "Server URL must start with http:// or https://, got '{}'",
                        base_url
                    )));
                }
                if username.is_empty() {
                    return Err(crate::Error::config("Username cannot be empty"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Client timeout must be > 0"));
                }
                Ok(())
            }
            ClientConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom client factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom client config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the client type name
    pub fn type_name(&self) -> &str {
        match self {
            ClientConfig::Rest { .. } => "rest",
            ClientConfig::Custom { factory, .. } => factory,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientConfig::Rest {
                base_url,
                username,
                timeout_secs,
                dry_run,
                ..
            } => f
                .debug_struct("Rest")
                .field("base_url", base_url)
                .field("username", username)
                .field("password", &"<redacted>")
                .field("timeout_secs", timeout_secs)
                .field("dry_run", dry_run)
                .finish(),
            ClientConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("State store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Capacity of the reconciler event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Compute and report plans without issuing create, patch or delete calls
    #[serde(default)]
    pub dry_run: bool,
}

impl ReconcilerConfig {
    /// Validate the reconciler configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            dry_run: false,
        }
    }
}

/// What the driver does with each desired resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Print the operations that would be applied
    #[default]
    Plan,
    /// Converge every resource
    Apply,
}

impl std::str::FromStr for RunMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plan" => Ok(RunMode::Plan),
            "apply" => Ok(RunMode::Apply),
            other => Err(crate::Error::config(format!(
                "Invalid mode '{}', must be 'plan' or 'apply'",
                other
            ))),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}

//! Core traits for the reconciliation engine
//!
//! - [`ConfigClient`]: Talk to the directory server's configuration API
//! - [`StateStore`]: Persist tracked observed state between runs

pub mod config_client;
pub mod state_store;

pub use config_client::{ConfigClient, ConfigClientFactory};
pub use state_store::{StateRecord, StateStore};

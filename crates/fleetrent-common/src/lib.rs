//! Shared plumbing used by every fleetrent crate: logging setup and the
//! layered configuration loader.

pub mod config;
pub mod logging;

pub use config::{load_layered, ConfigurationError};

//! Configuration for the bridge client.
//!
//! Settings persist to disk as RON. CLI flags override the loaded file and
//! optional positional arguments request an automatic connect on startup.

mod cli;
mod config;
mod error;

pub use cli::{AutoConnect, CliArgs};
pub use config::{Config, DebugConfig, NetworkConfig, ReconnectSettings, default_config_dir};
pub use error::ConfigError;

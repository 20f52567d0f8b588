//! Command-line argument parsing for the bridge client.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;
use crate::error::ConfigError;

/// Bridge client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`. Giving velocity,
/// wait time and direction connects immediately on startup.
#[derive(Parser, Debug, Default)]
#[command(name = "bridge-client", about = "Bridge simulation session client")]
#[command(allow_negative_numbers = true)]
pub struct CliArgs {
    /// Initial velocity for auto-connect.
    pub velocity: Option<i64>,

    /// Initial wait time in seconds for auto-connect.
    pub wait_time: Option<i64>,

    /// Initial direction for auto-connect (EAST_TO_WEST or WEST_TO_EAST).
    pub direction: Option<String>,

    /// Server address.
    #[arg(long)]
    pub server: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Parameters for connecting at startup. Values are validated by the session
/// client, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoConnect {
    /// Requested velocity.
    pub velocity: i64,
    /// Requested wait time.
    pub wait_time: i64,
    /// Requested direction word.
    pub direction: String,
}

impl CliArgs {
    /// Auto-connect parameters: all three positionals or none.
    pub fn auto_connect(&self) -> Result<Option<AutoConnect>, ConfigError> {
        match (self.velocity, self.wait_time, &self.direction) {
            (Some(velocity), Some(wait_time), Some(direction)) => Ok(Some(AutoConnect {
                velocity,
                wait_time,
                direction: direction.clone(),
            })),
            (None, None, None) => Ok(None),
            _ => Err(ConfigError::InvalidArgs(
                "auto-connect needs <velocity> <wait-time> <direction>".to_string(),
            )),
        }
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

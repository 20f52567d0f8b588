//! Session client for the bridge simulation authority: newline-delimited JSON
//! over TCP, a concurrently readable mirror of remote entity state, and a
//! bounded automatic reconnection policy that preserves session identity.

pub mod codec;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod reconnection;
pub mod state;
pub mod store;
mod worker;

pub use codec::{
    CarStatus, ClientMessage, Direction, EntityState, LineDecoder, PATH_LENGTH, ServerMessage,
};
pub use config::SessionConfig;
pub use controller::{SessionClient, TickOutcome};
pub use dispatch::{ConnectParams, Properties, parse_direction};
pub use error::{ConnectError, DecodeError, SessionError, SessionFault, ValidationError};
pub use reconnection::{ReconnectConfig, ReconnectState};
pub use state::{ConnectionState, ConnectionStateWatch};
pub use store::{EntityStatus, EntityStore, PALETTE, Rgb, TrackedEntity};

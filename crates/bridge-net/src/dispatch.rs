//! Validation of user intents before they become protocol messages.

use crate::codec::{ClientMessage, Direction};
use crate::error::ValidationError;

/// Velocity and wait time of the locally-owned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Properties {
    /// Units advanced per authority tick.
    pub velocity: u32,
    /// Cooldown between traversals, in seconds.
    pub wait_time: u32,
}

impl Properties {
    /// Validate raw integers. Both must be non-negative and fit in a `u32`.
    pub fn new(velocity: i64, wait_time: i64) -> Result<Self, ValidationError> {
        let velocity = u32::try_from(velocity).map_err(|_| ValidationError::Velocity(velocity))?;
        let wait_time =
            u32::try_from(wait_time).map_err(|_| ValidationError::WaitTime(wait_time))?;
        Ok(Self {
            velocity,
            wait_time,
        })
    }

    /// Validate text input such as form fields or CLI words.
    pub fn parse(velocity: &str, wait_time: &str) -> Result<Self, ValidationError> {
        Self::new(
            parse_integer("velocity", velocity)?,
            parse_integer("wait time", wait_time)?,
        )
    }

    pub(crate) fn to_message(self) -> ClientMessage {
        ClientMessage::ChangeCarProperties {
            velocity: self.velocity,
            wait_time: self.wait_time,
        }
    }
}

/// Everything needed to (re)send the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    /// Requested travel direction.
    pub direction: Direction,
    /// Velocity and wait time.
    pub properties: Properties,
}

impl ConnectParams {
    /// Validate a connect request.
    pub fn new(direction: Direction, velocity: i64, wait_time: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            direction,
            properties: Properties::new(velocity, wait_time)?,
        })
    }

    pub(crate) fn handshake(&self, client_id: String) -> ClientMessage {
        ClientMessage::InitialClientData {
            direction: self.direction,
            velocity: self.properties.velocity,
            wait_time: self.properties.wait_time,
            client_id,
        }
    }
}

/// Parse a user-supplied direction word.
pub fn parse_direction(input: &str) -> Result<Direction, ValidationError> {
    Direction::parse(input).ok_or_else(|| ValidationError::Direction(input.to_string()))
}

fn parse_integer(field: &'static str, input: &str) -> Result<i64, ValidationError> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::NotAnInteger {
            field,
            input: input.to_string(),
        })
}

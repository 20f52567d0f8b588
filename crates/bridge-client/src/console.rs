//! Line-oriented operator console: parses typed commands and renders the
//! mirrored entity table.

use std::fmt::Write as _;

use bridge_net::{
    ConnectionState, Direction, EntityState, Properties, SessionClient, TrackedEntity,
    ValidationError, parse_direction,
};

pub const HELP: &str = "\
commands:
  connect <velocity> <wait-time> <direction>   open a new session
  change <velocity> <wait-time>                request new properties
  end                                          end the session
  drop                                         simulate a lost connection
  status                                       show state and entities
  reload                                       re-read config.ron while idle
  help                                         show this text
  quit                                         end the session and exit";

/// One parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect {
        direction: Direction,
        properties: Properties,
    },
    Change(Properties),
    End,
    Drop,
    Status,
    Reload,
    Help,
    Quit,
}

/// Why a console line was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    Unknown(String),
    Usage(&'static str),
    Invalid(ValidationError),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty command"),
            ParseError::Unknown(word) => write!(f, "unknown command {word:?}, try `help`"),
            ParseError::Usage(usage) => write!(f, "usage: {usage}"),
            ParseError::Invalid(e) => write!(f, "{e}"),
        }
    }
}

impl From<ValidationError> for ParseError {
    fn from(e: ValidationError) -> Self {
        ParseError::Invalid(e)
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((head, args)) = words.split_first() else {
            return Err(ParseError::Empty);
        };

        match (head.to_ascii_lowercase().as_str(), args) {
            ("connect", [velocity, wait_time, direction]) => Ok(Command::Connect {
                direction: parse_direction(direction)?,
                properties: Properties::parse(velocity, wait_time)?,
            }),
            ("connect", _) => Err(ParseError::Usage("connect <velocity> <wait-time> <direction>")),
            ("change", [velocity, wait_time]) => {
                Ok(Command::Change(Properties::parse(velocity, wait_time)?))
            }
            ("change", _) => Err(ParseError::Usage("change <velocity> <wait-time>")),
            ("end", []) => Ok(Command::End),
            ("drop", []) => Ok(Command::Drop),
            ("status", []) => Ok(Command::Status),
            ("reload", []) => Ok(Command::Reload),
            ("help", []) => Ok(Command::Help),
            ("quit" | "exit", []) => Ok(Command::Quit),
            (other, _) => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

fn state_label(state: &EntityState) -> &str {
    match state {
        EntityState::Waiting => "WAITING",
        EntityState::Active => "CROSSING",
        EntityState::Cooldown => "COOLDOWN",
        EntityState::Other(raw) => raw.as_str(),
    }
}

/// Render one row per mirrored entity, marking the locally-owned one.
pub fn render_entities(entities: &[TrackedEntity], own_id: &str) -> String {
    if entities.is_empty() {
        return "  (no entities)".to_string();
    }
    let mut out = String::new();
    for entity in entities {
        let status = &entity.status;
        let marker = if !own_id.is_empty() && status.id == own_id {
            '*'
        } else {
            ' '
        };
        let direction = status
            .direction
            .map(|d| d.as_wire())
            .unwrap_or("NONE");
        let _ = writeln!(
            out,
            "{marker} {:<12} pos {:>3}  {:<12} {:<9} #{:02x}{:02x}{:02x}",
            status.id,
            status.position,
            direction,
            state_label(&status.state),
            entity.color.0,
            entity.color.1,
            entity.color.2,
        );
    }
    out.pop();
    out
}

/// Full status report for the `status` command.
pub fn render_status(client: &SessionClient) -> String {
    let state = match client.connection_state() {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
    };
    let id = client.session_id();
    let mut out = format!("state: {state}  session: {}", if id.is_empty() { "-" } else { &id });
    let message = client.status_message();
    if !message.is_empty() {
        let _ = write!(out, "  ({message})");
    }
    if let Some(active) = client.active_entity() {
        let _ = write!(out, "\non path: {active}");
    }
    out.push('\n');
    out.push_str(&render_entities(&client.snapshot(), &id));
    out
}

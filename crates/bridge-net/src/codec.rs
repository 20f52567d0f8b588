//! Newline-delimited JSON message codec.
//!
//! Every message on the wire is a single JSON object followed by `\n`:
//!
//! ```text
//! {"type":"END_CONNECTION"}\n
//! {"tipo":"CAR_STATUS","clientId":"Client-0","position":50,...}\n
//! ```
//!
//! Outbound messages are tagged by a `type` field, inbound messages by a
//! `tipo` field. [`LineDecoder`] reassembles frames from arbitrary read
//! boundaries; a malformed line is reported and skipped, never fatal.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

/// Logical length of the shared path. Positions are clamped into `[0, PATH_LENGTH]`.
pub const PATH_LENGTH: u32 = 300;

/// Default cap for a single line held in the carry-over buffer. 64 KiB.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Shared enums
// ---------------------------------------------------------------------------

/// Travel direction along the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Endpoint A to endpoint B (`EAST_TO_WEST` on the wire).
    EastToWest,
    /// Endpoint B to endpoint A (`WEST_TO_EAST` on the wire).
    WestToEast,
}

impl Direction {
    /// Wire representation.
    pub fn as_wire(self) -> &'static str {
        match self {
            Direction::EastToWest => "EAST_TO_WEST",
            Direction::WestToEast => "WEST_TO_EAST",
        }
    }

    /// Parse a wire or user-supplied direction. Returns `None` for unset or
    /// unrecognized values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EAST_TO_WEST" | "A_TO_B" => Some(Direction::EastToWest),
            "WEST_TO_EAST" | "B_TO_A" => Some(Direction::WestToEast),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

/// Lifecycle state of a remote entity as reported by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Queued, waiting for the path.
    Waiting,
    /// Currently traversing the path (`CROSSING` on the wire).
    Active,
    /// Finished a traversal, waiting before queueing again.
    Cooldown,
    /// Any other authority-defined state, kept verbatim.
    Other(String),
}

impl EntityState {
    fn from_wire(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "WAITING" => EntityState::Waiting,
            "CROSSING" | "ACTIVE" => EntityState::Active,
            "COOLDOWN" => EntityState::Cooldown,
            _ => EntityState::Other(s.to_string()),
        }
    }
}

impl Default for EntityState {
    fn default() -> Self {
        EntityState::Other("NONE".to_string())
    }
}

fn direction_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Direction>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.as_deref().and_then(Direction::parse))
}

fn state_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<EntityState, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.as_deref().map(EntityState::from_wire).unwrap_or_default())
}

fn position_clamped<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let raw: Option<i64> = Option::deserialize(d)?;
    Ok(raw.unwrap_or(0).clamp(0, i64::from(PATH_LENGTH)) as u32)
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Message sent from the client to the authority.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Initial or resuming handshake. An empty `client_id` asks for a new session.
    #[serde(rename = "INITIAL_CLIENT_DATA", rename_all = "camelCase")]
    InitialClientData {
        /// Requested travel direction.
        direction: Direction,
        /// Units advanced per authority tick.
        velocity: u32,
        /// Cooldown between traversals, in seconds.
        wait_time: u32,
        /// Session identity to resume, or empty.
        client_id: String,
    },
    /// Change the properties of the locally-owned entity.
    #[serde(rename = "CHANGE_CAR_PROPERTIES", rename_all = "camelCase")]
    ChangeCarProperties {
        /// New velocity.
        velocity: u32,
        /// New wait time.
        wait_time: u32,
    },
    /// Terminate the logical session.
    #[serde(rename = "END_CONNECTION")]
    EndConnection,
}

impl ClientMessage {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::InitialClientData { .. } => "INITIAL_CLIENT_DATA",
            ClientMessage::ChangeCarProperties { .. } => "CHANGE_CAR_PROPERTIES",
            ClientMessage::EndConnection => "END_CONNECTION",
        }
    }
}

/// Serialize a message as one JSON record terminated by `\n`.
pub fn encode(message: &ClientMessage) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Status update for one remote entity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarStatus {
    /// Entity identifier. Updates with an empty id are ignored.
    #[serde(default)]
    pub client_id: String,
    /// Position along the path, clamped into `[0, PATH_LENGTH]`.
    #[serde(default, deserialize_with = "position_clamped")]
    pub position: u32,
    /// Travel direction, `None` when unset.
    #[serde(default, deserialize_with = "direction_lenient")]
    pub direction: Option<Direction>,
    /// Whether the entity is currently on the path.
    #[serde(default)]
    pub is_crossing: bool,
    /// Lifecycle state.
    #[serde(default, deserialize_with = "state_lenient")]
    pub state: EntityState,
}

/// Message received from the authority.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tipo")]
pub enum ServerMessage {
    /// Handshake accepted; carries the (new or resumed) session identity.
    #[serde(rename = "CONNECTED", rename_all = "camelCase")]
    Connected {
        /// Assigned session identity.
        #[serde(default)]
        client_id: String,
    },
    /// Full status of one entity.
    #[serde(rename = "CAR_STATUS")]
    CarStatus(CarStatus),
    /// An entity started its traversal.
    #[serde(rename = "CAR_START", rename_all = "camelCase")]
    CarStart {
        /// Entity that took the path.
        #[serde(default)]
        client_id: String,
    },
    /// An entity finished its traversal.
    #[serde(rename = "CAR_END", rename_all = "camelCase")]
    CarEnd {
        /// Entity that left the path.
        #[serde(default)]
        client_id: String,
    },
    /// The authority applied a property change.
    #[serde(
        rename = "CHANGE_CAR_PROPERTIES_ACK",
        alias = "CHANGE_CHANGE_CAR_PROPERTIES_ACK"
    )]
    ChangeCarPropertiesAck,
    /// Any message kind this client does not understand.
    #[serde(other)]
    Unknown,
}

/// Reassembles newline-delimited frames from a byte stream.
///
/// Holds only the bytes after the last complete newline between calls.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    max_line_length: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineDecoder {
    /// Create a decoder that discards any partial line longer than `max_line_length`.
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_length,
        }
    }

    /// Append `bytes` and return every message completed by them, in order.
    ///
    /// Blank lines are skipped. Lines that fail to parse yield a
    /// [`DecodeError`] in place and decoding continues with the remainder.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<ServerMessage, DecodeError>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(decoded) = decode_line(&self.buf[start..end]) {
                out.push(decoded);
            }
            start = end + 1;
        }
        self.buf.drain(..start);

        if self.buf.len() > self.max_line_length {
            let len = self.buf.len();
            self.buf.clear();
            out.push(Err(DecodeError::LineTooLong {
                len,
                max: self.max_line_length,
            }));
        }

        out
    }

    /// Number of bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<Result<ServerMessage, DecodeError>> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line,
        Err(_) => {
            return Some(Err(DecodeError::InvalidUtf8 {
                line: String::from_utf8_lossy(raw).into_owned(),
            }));
        }
    };
    if line.trim().is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(line).map_err(|source| DecodeError::Malformed {
            line: line.to_string(),
            source,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS_LINE: &[u8] = br#"{"tipo":"CAR_STATUS","clientId":"c1","position":50,"direction":"A_TO_B","isCrossing":true,"state":"Active"}
"#;

    fn messages(decoded: Vec<Result<ServerMessage, DecodeError>>) -> Vec<ServerMessage> {
        decoded.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_handshake_encoding() {
        let msg = ClientMessage::InitialClientData {
            direction: Direction::EastToWest,
            velocity: 10,
            wait_time: 3,
            client_id: String::new(),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(*bytes.last().unwrap(), b'\n');
        assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 1);

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "INITIAL_CLIENT_DATA");
        assert_eq!(value["direction"], "EAST_TO_WEST");
        assert_eq!(value["velocity"], 10);
        assert_eq!(value["waitTime"], 3);
        assert_eq!(value["clientId"], "");
    }

    #[test]
    fn test_property_change_and_end_encoding() {
        let bytes = encode(&ClientMessage::ChangeCarProperties {
            velocity: 7,
            wait_time: 0,
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "CHANGE_CAR_PROPERTIES");
        assert_eq!(value["velocity"], 7);
        assert_eq!(value["waitTime"], 0);

        let bytes = encode(&ClientMessage::EndConnection).unwrap();
        assert_eq!(bytes, b"{\"type\":\"END_CONNECTION\"}\n");
    }

    #[test]
    fn test_split_reads_reassemble() {
        let mut whole = LineDecoder::default();
        let expected = messages(whole.feed(STATUS_LINE));
        assert_eq!(expected.len(), 1);

        let mut split = LineDecoder::default();
        let mut got = Vec::new();
        got.extend(messages(split.feed(&STATUS_LINE[..10])));
        assert!(got.is_empty());
        got.extend(messages(split.feed(&STATUS_LINE[10..30])));
        assert!(got.is_empty());
        got.extend(messages(split.feed(&STATUS_LINE[30..])));
        assert_eq!(got, expected);
        assert_eq!(split.pending(), 0);
    }

    #[test]
    fn test_every_split_point_matches_contiguous_decode() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"{\"tipo\":\"CONNECTED\",\"clientId\":\"c1\"}\n");
        stream.extend_from_slice(STATUS_LINE);
        stream.extend_from_slice(b"{\"tipo\":\"CAR_END\",\"clientId\":\"c1\"}\n");

        let expected = messages(LineDecoder::default().feed(&stream));
        assert_eq!(expected.len(), 3);

        for cut in 0..stream.len() {
            let mut decoder = LineDecoder::default();
            let mut got = messages(decoder.feed(&stream[..cut]));
            got.extend(messages(decoder.feed(&stream[cut..])));
            assert_eq!(got, expected, "split at byte {cut}");
        }
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut decoder = LineDecoder::default();
        let got = messages(decoder.feed(
            b"{\"tipo\":\"CAR_START\",\"clientId\":\"a\"}\n{\"tipo\":\"CAR_END\",\"clientId\":\"a\"}\n",
        ));
        assert_eq!(
            got,
            vec![
                ServerMessage::CarStart {
                    client_id: "a".into()
                },
                ServerMessage::CarEnd {
                    client_id: "a".into()
                },
            ]
        );
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut decoder = LineDecoder::default();
        let got = decoder.feed(b"\n   \n\r\n{\"tipo\":\"CHANGE_CAR_PROPERTIES_ACK\"}\r\n");
        assert_eq!(messages(got), vec![ServerMessage::ChangeCarPropertiesAck]);
    }

    #[test]
    fn test_malformed_line_does_not_stop_stream() {
        let mut decoder = LineDecoder::default();
        let got = decoder.feed(b"{not json\n{\"tipo\":\"CAR_END\",\"clientId\":\"x\"}\n");
        assert_eq!(got.len(), 2);
        match &got[0] {
            Err(DecodeError::Malformed { line, .. }) => assert_eq!(line, "{not json"),
            other => panic!("expected malformed error, got {other:?}"),
        }
        assert!(matches!(&got[1], Ok(ServerMessage::CarEnd { client_id }) if client_id == "x"));
    }

    #[test]
    fn test_missing_tag_is_decode_error() {
        let mut decoder = LineDecoder::default();
        let got = decoder.feed(b"{\"clientId\":\"x\"}\n");
        assert!(matches!(got.as_slice(), [Err(DecodeError::Malformed { .. })]));
    }

    #[test]
    fn test_unknown_kind_decodes_as_unknown() {
        let mut decoder = LineDecoder::default();
        let got = decoder.feed(b"{\"tipo\":\"REQUEST_BRIDGE_ACCESS\",\"clientId\":\"x\"}\n");
        assert_eq!(messages(got), vec![ServerMessage::Unknown]);
    }

    #[test]
    fn test_legacy_ack_spelling_accepted() {
        let mut decoder = LineDecoder::default();
        let got = decoder.feed(b"{\"tipo\":\"CHANGE_CHANGE_CAR_PROPERTIES_ACK\"}\n");
        assert_eq!(messages(got), vec![ServerMessage::ChangeCarPropertiesAck]);
    }

    #[test]
    fn test_status_fields_and_defaults() {
        let mut decoder = LineDecoder::default();
        let got = messages(decoder.feed(STATUS_LINE));
        let ServerMessage::CarStatus(status) = &got[0] else {
            panic!("expected CAR_STATUS");
        };
        assert_eq!(status.client_id, "c1");
        assert_eq!(status.position, 50);
        assert_eq!(status.direction, Some(Direction::EastToWest));
        assert!(status.is_crossing);
        assert_eq!(status.state, EntityState::Active);

        let got = messages(decoder.feed(b"{\"tipo\":\"CAR_STATUS\",\"clientId\":\"c2\"}\n"));
        let ServerMessage::CarStatus(status) = &got[0] else {
            panic!("expected CAR_STATUS");
        };
        assert_eq!(status.position, 0);
        assert_eq!(status.direction, None);
        assert!(!status.is_crossing);
        assert_eq!(status.state, EntityState::Other("NONE".into()));
    }

    #[test]
    fn test_wire_state_values() {
        let mut decoder = LineDecoder::default();
        let line = b"{\"tipo\":\"CAR_STATUS\",\"clientId\":\"c\",\"direction\":\"WEST_TO_EAST\",\"state\":\"COOLDOWN\",\"position\":999}\n";
        let got = messages(decoder.feed(line));
        let ServerMessage::CarStatus(status) = &got[0] else {
            panic!("expected CAR_STATUS");
        };
        assert_eq!(status.direction, Some(Direction::WestToEast));
        assert_eq!(status.state, EntityState::Cooldown);
        assert_eq!(status.position, PATH_LENGTH);

        let got = messages(decoder.feed(
            b"{\"tipo\":\"CAR_STATUS\",\"clientId\":\"c\",\"direction\":\"NONE\",\"state\":\"PARKED\",\"position\":-4}\n",
        ));
        let ServerMessage::CarStatus(status) = &got[0] else {
            panic!("expected CAR_STATUS");
        };
        assert_eq!(status.direction, None);
        assert_eq!(status.state, EntityState::Other("PARKED".into()));
        assert_eq!(status.position, 0);
    }

    #[test]
    fn test_utf8_split_across_reads() {
        let line = "{\"tipo\":\"CAR_END\",\"clientId\":\"coché\"}\n".as_bytes();
        let cut = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut decoder = LineDecoder::default();
        assert!(decoder.feed(&line[..cut]).is_empty());
        let got = messages(decoder.feed(&line[cut..]));
        assert_eq!(
            got,
            vec![ServerMessage::CarEnd {
                client_id: "coché".into()
            }]
        );
    }

    #[test]
    fn test_overlong_partial_line_discarded() {
        let mut decoder = LineDecoder::new(16);
        let got = decoder.feed(&[b'x'; 32]);
        assert!(matches!(
            got.as_slice(),
            [Err(DecodeError::LineTooLong { len: 32, max: 16 })]
        ));
        assert_eq!(decoder.pending(), 0);

        let got = messages(decoder.feed(b"{\"tipo\":\"X\"}\n"));
        assert_eq!(got, vec![ServerMessage::Unknown]);
    }
}

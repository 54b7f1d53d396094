//! Length-prefixed message framing
//!
//! Every message on the wire is a 4-byte big-endian length followed by that
//! many bytes of JSON envelope:
//!
//! ```text
//! [u32 length][{"message_type": "...", "sequence": n, "timestamp": t,
//!               "player_id": ..., "protocol_version": 1, "data": {...}}]
//! ```
//!
//! [`FrameDecoder`] reassembles envelopes from an arbitrarily chunked byte
//! stream.

use crate::actions::{Action, ActionError, ActionExecutionResult, ActionType};
use crate::timestamp_secs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

pub const HEADER_SIZE: usize = 4;
pub const PROTOCOL_VERSION: u32 = 1;
/// Largest frame, header included, either side will produce or accept
pub const MAX_PACKET_SIZE: usize = 64 * 1024;
const SEQUENCE_MODULUS: u32 = 1 << 16;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid message payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("message too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("protocol version mismatch: expected {expected}, got {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("frame length mismatch: header says {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("invalid action: {0}")]
    Action(#[from] ActionError),
}

/// Tag carried in every envelope's `message_type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum MessageType {
    Connect,
    ConnectResponse,
    Disconnect,
    Ping,
    Pong,
    Handshake,
    HandshakeResponse,
    ActionResult,
    Error,
    /// An action submission, tagged with the action's own type string
    Action(ActionType),
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Connect => "CONNECT",
            MessageType::ConnectResponse => "CONNECT_RESPONSE",
            MessageType::Disconnect => "DISCONNECT",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::Handshake => "HANDSHAKE",
            MessageType::HandshakeResponse => "HANDSHAKE_RESPONSE",
            MessageType::ActionResult => "ACTION_RESULT",
            MessageType::Error => "ERROR",
            MessageType::Action(action_type) => action_type.as_str(),
        }
    }

    pub fn action_type(self) -> Option<ActionType> {
        match self {
            MessageType::Action(action_type) => Some(action_type),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let message_type = match s {
            "CONNECT" => MessageType::Connect,
            "CONNECT_RESPONSE" => MessageType::ConnectResponse,
            "DISCONNECT" => MessageType::Disconnect,
            "PING" => MessageType::Ping,
            "PONG" => MessageType::Pong,
            "HANDSHAKE" => MessageType::Handshake,
            "HANDSHAKE_RESPONSE" => MessageType::HandshakeResponse,
            "ACTION_RESULT" => MessageType::ActionResult,
            "ERROR" => MessageType::Error,
            other => ActionType::from_str(other)
                .map(MessageType::Action)
                .map_err(|_| ProtocolError::UnknownMessageType(other.to_string()))?,
        };
        Ok(message_type)
    }
}

impl From<MessageType> for String {
    fn from(message_type: MessageType) -> Self {
        message_type.as_str().to_string()
    }
}

impl TryFrom<String> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, <MessageType as TryFrom<String>>::Error> {
        value.parse()
    }
}

/// One decoded message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_type: MessageType,
    pub sequence: u32,
    pub timestamp: f64,
    #[serde(default)]
    pub player_id: Option<String>,
    pub protocol_version: u32,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Rebuilds the action carried by an action message
    pub fn to_action(&self) -> Result<Action, ActionError> {
        Action::from_serializable_data(&self.data)
    }

    /// Splits an `ACTION_RESULT` payload into the action id and its result
    pub fn to_action_result(&self) -> Result<(String, ActionExecutionResult), ProtocolError> {
        let action_id = self
            .data
            .get("action_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let result = serde_json::from_value(Value::Object(self.data.clone()))?;
        Ok((action_id, result))
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }
}

/// Packs outgoing messages and stamps them with a per-protocol sequence
/// number
#[derive(Debug, Default)]
pub struct Protocol {
    sequence: AtomicU32,
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl Protocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number, wrapping at 65536
    pub fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed) % SEQUENCE_MODULUS
    }

    pub fn pack_message(
        &self,
        message_type: MessageType,
        data: Map<String, Value>,
        player_id: Option<&str>,
    ) -> Result<Vec<u8>, ProtocolError> {
        let envelope = Envelope {
            message_type,
            sequence: self.next_sequence(),
            timestamp: timestamp_secs(),
            player_id: player_id.map(str::to_string),
            protocol_version: PROTOCOL_VERSION,
            data,
        };
        encode(&envelope)
    }

    pub fn connect(&self, player_name: &str) -> Result<Vec<u8>, ProtocolError> {
        let data = json!({
            "player_name": player_name,
            "client_version": PROTOCOL_VERSION,
        });
        self.pack_message(MessageType::Connect, object(data), None)
    }

    pub fn connect_response(
        &self,
        success: bool,
        player_id: Option<&str>,
        error_message: Option<&str>,
        server_info: Value,
    ) -> Result<Vec<u8>, ProtocolError> {
        let data = json!({
            "success": success,
            "player_id": player_id,
            "error_message": error_message,
            "server_info": server_info,
        });
        self.pack_message(MessageType::ConnectResponse, object(data), None)
    }

    pub fn disconnect(&self, reason: &str) -> Result<Vec<u8>, ProtocolError> {
        self.pack_message(
            MessageType::Disconnect,
            object(json!({ "reason": reason })),
            None,
        )
    }

    pub fn ping(&self) -> Result<Vec<u8>, ProtocolError> {
        self.pack_message(
            MessageType::Ping,
            object(json!({ "ping_time": timestamp_secs() })),
            None,
        )
    }

    pub fn pong(&self, ping_time: f64) -> Result<Vec<u8>, ProtocolError> {
        let data = json!({
            "ping_time": ping_time,
            "pong_time": timestamp_secs(),
        });
        self.pack_message(MessageType::Pong, object(data), None)
    }

    pub fn action(&self, action: &Action) -> Result<Vec<u8>, ProtocolError> {
        self.pack_message(
            MessageType::Action(action.action_type()),
            action.get_serializable_data(),
            Some(action.player_id()),
        )
    }

    pub fn action_result(
        &self,
        action_id: &str,
        player_id: &str,
        result: &ActionExecutionResult,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut data = object(serde_json::to_value(result)?);
        data.insert("action_id".to_string(), Value::from(action_id));
        self.pack_message(MessageType::ActionResult, data, Some(player_id))
    }

    pub fn error(&self, error_code: &str, error_message: &str) -> Result<Vec<u8>, ProtocolError> {
        let data = json!({
            "error_code": error_code,
            "error_message": error_message,
        });
        self.pack_message(MessageType::Error, object(data), None)
    }
}

/// Serializes an envelope into a complete frame
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(envelope)?;
    let size = HEADER_SIZE + payload.len();
    if size > MAX_PACKET_SIZE {
        return Err(ProtocolError::TooLarge {
            size,
            max: MAX_PACKET_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(size);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Parses the JSON payload of a frame, without its header
pub fn unpack_payload(payload: &[u8]) -> Result<Envelope, ProtocolError> {
    let envelope: Envelope = serde_json::from_slice(payload)?;
    if envelope.protocol_version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found: envelope.protocol_version,
        });
    }
    Ok(envelope)
}

/// Parses one complete frame, header included
pub fn unpack_message(frame: &[u8]) -> Result<Envelope, ProtocolError> {
    if frame.len() < HEADER_SIZE {
        return Err(ProtocolError::LengthMismatch {
            declared: HEADER_SIZE,
            actual: frame.len(),
        });
    }
    let declared = declared_length(frame);
    let actual = frame.len() - HEADER_SIZE;
    if declared != actual {
        return Err(ProtocolError::LengthMismatch { declared, actual });
    }
    unpack_payload(&frame[HEADER_SIZE..])
}

fn declared_length(buffer: &[u8]) -> usize {
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&buffer[..HEADER_SIZE]);
    u32::from_be_bytes(header) as usize
}

/// Reassembles frames from a byte stream.
///
/// Bytes are buffered until a whole frame is present. Any framing or parse
/// error discards the entire buffer, including frames queued behind the bad
/// one, so the stream resynchronises on the next read.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Removes the next complete payload from the buffer, or `None` if a
    /// whole frame has not arrived yet
    pub fn next_payload(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let declared = declared_length(&self.buffer);
        let size = HEADER_SIZE + declared;
        if size > MAX_PACKET_SIZE {
            self.buffer.clear();
            return Err(ProtocolError::TooLarge {
                size,
                max: MAX_PACKET_SIZE,
            });
        }
        if self.buffer.len() < size {
            return Ok(None);
        }

        let payload = self.buffer[HEADER_SIZE..size].to_vec();
        self.buffer.drain(..size);
        Ok(Some(payload))
    }

    /// Removes and parses the next complete envelope
    pub fn next_frame(&mut self) -> Result<Option<Envelope>, ProtocolError> {
        let Some(payload) = self.next_payload()? else {
            return Ok(None);
        };
        match unpack_payload(&payload) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }
}

//! Outbound command payloads accepted by the Send Gate.

use crate::{
    config::IdentifyProperties,
    error::{SendError, SendErrorType},
    message::Message,
};
use serde::{Serialize, Serializer};

mod private {
    /// Disallow external implementations of [`super::Command`].
    pub trait Sealed {}
}

/// Marker for a type that can be sent to the gateway as an outbound command.
///
/// This trait is sealed: it can only be implemented by types in this crate.
pub trait Command: private::Sealed + Serialize {
    /// Opcode the command is sent under.
    const OP: u8;
}

/// Opcode integer values fixed by the wire protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum OpCode {
    /// An event was dispatched.
    Dispatch = 0,
    /// Fired periodically by the client to keep the connection alive.
    Heartbeat = 1,
    /// Start a new session.
    Identify = 2,
    /// Update the client's presence.
    StatusUpdate = 3,
    /// Join, leave, or move between voice channels.
    VoiceStateUpdate = 4,
    /// Resume a previous session.
    Resume = 6,
    /// Server is going away; reconnect and resume immediately.
    Reconnect = 7,
    /// Request a list of guild members.
    RequestGuildMembers = 8,
    /// The session has been invalidated; reconnect and reidentify.
    InvalidSession = 9,
    /// The first message sent after connecting, contains heartbeat interval.
    Hello = 10,
    /// Acknowledges a heartbeat was received.
    HeartbeatAck = 11,
}

/// Keeps the connection alive and can be used to determine latency.
///
/// Its payload is the bare last-observed sequence number (or `null`), not an
/// object, so it serializes directly rather than through a nested field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Heartbeat {
    /// Last sequence number the client has received, if any.
    sequence: Option<u64>,
}

impl Heartbeat {
    /// Create a new heartbeat command carrying the last observed sequence.
    pub const fn new(sequence: Option<u64>) -> Self {
        Self { sequence }
    }
}

impl Serialize for Heartbeat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.sequence.serialize(serializer)
    }
}

impl private::Sealed for Heartbeat {}
impl Command for Heartbeat {
    const OP: u8 = OpCode::Heartbeat as u8;
}

/// Payload of an [`Identify`] command's `shard` field.
pub type ShardInfo = [u64; 2];

/// Starts a new session during the initial handshake.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Identify {
    /// Information about the shard to identify as, if sharded.
    #[serde(skip_serializing_if = "Option::is_none")]
    shard: Option<ShardInfo>,
    /// Authentication token.
    token: String,
    /// Whether this connection supports compression of packets.
    ///
    /// Always `false`: compression is handled in-band by the Decoder
    /// Pipeline rather than via transport-level compression.
    compress: bool,
    /// Value between 50 and 250, total number of members where the gateway
    /// will stop sending offline members in the guild member list.
    large_threshold: u64,
    /// Initial presence, if any was configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    presence: Option<serde_json::Value>,
    /// Identity of this library, shown to the server and to other clients.
    properties: SerializableIdentifyProperties,
}

/// Serializable mirror of [`IdentifyProperties`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
struct SerializableIdentifyProperties {
    #[serde(rename = "$os")]
    os: Box<str>,
    #[serde(rename = "$browser")]
    browser: Box<str>,
    #[serde(rename = "$device")]
    device: Box<str>,
}

impl From<&IdentifyProperties> for SerializableIdentifyProperties {
    fn from(properties: &IdentifyProperties) -> Self {
        Self {
            os: properties.os.clone(),
            browser: properties.browser.clone(),
            device: properties.device.clone(),
        }
    }
}

impl Identify {
    /// Create a new identify command.
    pub fn new(
        token: String,
        shard: Option<ShardInfo>,
        properties: &IdentifyProperties,
        large_threshold: u64,
        presence: Option<serde_json::Value>,
    ) -> Self {
        Self {
            shard,
            token,
            compress: false,
            large_threshold,
            presence,
            properties: properties.into(),
        }
    }
}

impl private::Sealed for Identify {}
impl Command for Identify {
    const OP: u8 = OpCode::Identify as u8;
}

/// Resumes a dropped gateway session.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Resume {
    /// Authentication token used to open the session initially.
    token: String,
    /// ID of the dropped session to resume.
    session_id: String,
    /// Last sequence number received before the disconnect.
    seq: u64,
}

impl Resume {
    /// Create a new resume command.
    pub const fn new(token: String, session_id: String, seq: u64) -> Self {
        Self {
            token,
            session_id,
            seq,
        }
    }
}

impl private::Sealed for Resume {}
impl Command for Resume {
    const OP: u8 = OpCode::Resume as u8;
}

/// Outbound command not otherwise modeled by this crate: an opcode paired
/// with an opaque JSON payload.
///
/// Used for `STATUS_UPDATE`, `VOICE_STATE_UPDATE`, and
/// `REQUEST_GUILD_MEMBERS`, whose payload shape is not further specified by
/// the wire contract beyond the envelope.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawCommand {
    /// Opaque payload handed to the Send Gate untouched.
    d: serde_json::Value,
    /// Opcode the payload is sent under.
    #[serde(skip)]
    op: u8,
}

impl RawCommand {
    /// Create a new raw command with the given opcode and payload.
    pub const fn new(op: u8, d: serde_json::Value) -> Self {
        Self { d, op }
    }
}

impl private::Sealed for RawCommand {}

/// Serialize `command` into the four-field envelope and wrap it as an
/// outbound [`Message`].
///
/// # Errors
///
/// Returns [`SendErrorType::Serializing`] if the command could not be
/// serialized to JSON.
pub fn prepare<C: Command>(command: &C) -> Result<Message, SendError> {
    prepare_raw(C::OP, command)
}

/// Serialize an opcode plus payload into the four-field envelope.
///
/// Used both by [`prepare`] and directly for [`RawCommand`], whose opcode is
/// not known at compile time via the `Command` trait.
pub(crate) fn prepare_raw(
    op: u8,
    payload: &impl Serialize,
) -> Result<Message, SendError> {
    #[derive(Serialize)]
    struct Envelope<'a, T> {
        op: u8,
        d: &'a T,
    }

    let json = serde_json::to_string(&Envelope { op, d: payload }).map_err(|source| SendError {
        kind: SendErrorType::Serializing,
        source: Some(Box::new(source)),
    })?;

    Ok(Message::Text(json))
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Session wire schema for the lip-sync command hub.
//!
//! Consumers (animation hosts) `attach` and receive the hub's current command
//! as a `baseline`, then one `push` per replacement. Producers `publish`
//! commands and get the stored version back in a `publish_ack`.
//! Messages travel as CBOR `OpEnvelope`s inside checksummed packets (see [`wire`]).

pub use lipsync_core::{Command, VersionedCommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod wire;

/// Fixed application name; the hub endpoint is derived from it.
pub const APP_NAME: &str = "lipsync-hub";

/// Default Unix socket path for the hub.
///
/// Prefers a per-user runtime dir (XDG_RUNTIME_DIR) and falls back to the
/// system temp dir when unavailable.
pub fn default_socket_path() -> PathBuf {
    let base = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    base.join(format!("{APP_NAME}.sock"))
}

/// Canonical OpEnvelope carried as the payload of a packet.
///
/// * `op` – operation name.
/// * `ts` – logical timestamp (authoritative on the hub side).
/// * `payload` – operation specific body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpEnvelope<P> {
    /// Operation name (e.g. "attach", "push").
    pub op: String,
    /// Logical timestamp, strictly increasing per hub connection.
    pub ts: u64,
    /// Operation-specific body.
    pub payload: P,
}

/// What a connecting client intends to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientRole {
    /// Animation host; attaches and receives pushes.
    Consumer,
    /// Editing front end; publishes commands.
    Producer,
}

/// Handshake request payload (client → hub).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakePayload {
    /// Optional agent identifier, used in hub logs.
    pub agent_id: Option<String>,
    /// Declared role.
    pub role: ClientRole,
    /// Implementation version (not wire version).
    pub client_version: u32,
}

/// Status enumeration for handshake ack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AckStatus {
    /// Handshake succeeded.
    #[serde(rename = "OK")]
    Ok,
    /// Handshake failed.
    #[serde(rename = "ERROR")]
    Error,
}

/// Handshake acknowledgement payload (hub → client).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeAckPayload {
    /// Status of the handshake.
    pub status: AckStatus,
    /// Hub implementation version.
    pub server_version: u32,
    /// Identifier the hub assigned to this connection.
    pub session_id: String,
    /// Present when status == Error.
    pub error: Option<ErrorPayload>,
}

/// Error payload used in error and handshake_ack responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Numeric error code.
    pub code: u32,
    /// Stable identifier (e.g. "E_INVALID_ARGUMENT").
    pub name: String,
    /// Human readable message.
    pub message: String,
}

impl ErrorPayload {
    /// Stable name for rejected command inputs.
    pub const INVALID_ARGUMENT: &'static str = "E_INVALID_ARGUMENT";
    /// Stable name for undecodable payloads.
    pub const BAD_PAYLOAD: &'static str = "E_BAD_PAYLOAD";
    /// Stable name for ops a client may not send.
    pub const INVALID_OP: &'static str = "E_INVALID_OP";

    /// Command inputs were rejected; the store was not touched.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            name: Self::INVALID_ARGUMENT.into(),
            message: message.into(),
        }
    }

    /// A packet could not be decoded.
    pub fn bad_payload(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            name: Self::BAD_PAYLOAD.into(),
            message: message.into(),
        }
    }

    /// The op is not valid in this direction or role.
    pub fn invalid_op(message: impl Into<String>) -> Self {
        Self {
            code: 3,
            name: Self::INVALID_OP.into(),
            message: message.into(),
        }
    }

    /// Whether this error reports rejected command inputs.
    pub fn is_invalid_argument(&self) -> bool {
        self.name == Self::INVALID_ARGUMENT
    }
}

/// Body of a `publish_ack`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishAckPayload {
    /// Version the published command was stored under.
    pub version: u64,
}

/// Wire message kinds carried inside OpEnvelope payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Handshake request (op = "handshake").
    Handshake(HandshakePayload),
    /// Handshake acknowledgement (op = "handshake_ack").
    HandshakeAck(HandshakeAckPayload),
    /// Protocol or processing error (op = "error").
    Error(ErrorPayload),
    /// Become a push target (op = "attach"). Answered with a `Baseline`.
    Attach,
    /// Stop receiving pushes without closing the connection (op = "detach").
    Detach,
    /// The hub's current command at attach time (op = "baseline").
    Baseline(VersionedCommand),
    /// A newly stored command (op = "push").
    Push(VersionedCommand),
    /// Replace the hub's command (op = "publish").
    Publish(Command),
    /// Version assigned to a published command (op = "publish_ack").
    PublishAck(PublishAckPayload),
}

impl Message {
    /// Canonical op string for this message variant.
    pub fn op_name(&self) -> &'static str {
        match self {
            Message::Handshake(_) => "handshake",
            Message::HandshakeAck(_) => "handshake_ack",
            Message::Error(_) => "error",
            Message::Attach => "attach",
            Message::Detach => "detach",
            Message::Baseline(_) => "baseline",
            Message::Push(_) => "push",
            Message::Publish(_) => "publish",
            Message::PublishAck(_) => "publish_ack",
        }
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Packet framing and CBOR helpers.
//!
//! Packet layout:
//!
//! ``MAGIC(4) || VERSION(2) || FLAGS(2) || LENGTH(4) || PAYLOAD || CHECKSUM(32)``
//!
//! * PAYLOAD is a CBOR `OpEnvelope`
//! * CHECKSUM = blake3-256 over HEADER (first 12 bytes) || PAYLOAD

use blake3::Hasher;
use ciborium::value::Value;
use serde::{de::DeserializeOwned, Serialize};
use std::io::Read;
use thiserror::Error;

use crate::{Message, OpEnvelope, PublishAckPayload};

/// Protocol magic constant "LSY!".
pub const MAGIC: [u8; 4] = [0x4c, 0x53, 0x59, 0x21];
/// Wire protocol version (big-endian u16).
pub const VERSION: u16 = 0x0001;
/// Reserved flags (set to zero for v1).
pub const FLAGS: u16 = 0x0000;
/// Header length in bytes.
pub const HEADER_LEN: usize = 12;
/// Trailing checksum length in bytes.
pub const CHECKSUM_LEN: usize = 32;
/// Largest payload either side accepts.
pub const MAX_PAYLOAD: usize = 8 * 1024 * 1024;

/// Framing or codec failure.
#[derive(Debug, Error)]
pub enum WireError {
    /// Not enough bytes for a full packet.
    #[error("incomplete packet")]
    Incomplete,
    /// Header does not start with [`MAGIC`].
    #[error("bad magic")]
    BadMagic,
    /// Header carries a version this build does not speak.
    #[error("unsupported wire version {0:#06x}")]
    UnsupportedVersion(u16),
    /// Declared payload length exceeds [`MAX_PAYLOAD`].
    #[error("payload of {0} bytes exceeds limit")]
    PayloadTooLarge(usize),
    /// Checksum does not match header and payload.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),
    /// CBOR decoding failed or the payload did not match its op.
    #[error("decode error: {0}")]
    Decode(String),
    /// Envelope names an op this build does not know.
    #[error("unknown op {0}")]
    UnknownOp(String),
    /// Underlying stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decode from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    ciborium::de::from_reader(bytes).map_err(|e| WireError::Decode(e.to_string()))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, WireError> {
    Value::serialized(value).map_err(|e| WireError::Encode(e.to_string()))
}

fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, WireError> {
    value
        .deserialized()
        .map_err(|e| WireError::Decode(e.to_string()))
}

fn checksum(header: &[u8], payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

/// Validate a header and return the full packet length it announces.
///
/// Returns `Ok(None)` while fewer than [`HEADER_LEN`] bytes are buffered, so
/// streaming readers can accumulate and retry.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, WireError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    if buf[0..4] != MAGIC {
        return Err(WireError::BadMagic);
    }
    let version = u16::from_be_bytes([buf[4], buf[5]]);
    if version != VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    let len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
    if len > MAX_PAYLOAD {
        return Err(WireError::PayloadTooLarge(len));
    }
    Ok(Some(HEADER_LEN + len + CHECKSUM_LEN))
}

/// Wrap a CBOR payload into a full packet.
pub fn encode_packet(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(WireError::PayloadTooLarge(payload.len()));
    }
    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(&MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_be_bytes());
    header[6..8].copy_from_slice(&FLAGS.to_be_bytes());
    header[8..12].copy_from_slice(&(payload.len() as u32).to_be_bytes());

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    out.extend_from_slice(&header);
    out.extend_from_slice(payload);
    out.extend_from_slice(&checksum(&header, payload));
    Ok(out)
}

/// Verify a packet and return its payload slice plus bytes consumed.
pub fn decode_packet(bytes: &[u8]) -> Result<(&[u8], usize), WireError> {
    let total = frame_len(bytes)?.ok_or(WireError::Incomplete)?;
    if bytes.len() < total {
        return Err(WireError::Incomplete);
    }
    let header = &bytes[..HEADER_LEN];
    let payload = &bytes[HEADER_LEN..total - CHECKSUM_LEN];
    if checksum(header, payload)[..] != bytes[total - CHECKSUM_LEN..total] {
        return Err(WireError::ChecksumMismatch);
    }
    Ok((payload, total))
}

/// Encode a `Message` into a packet with the provided logical timestamp.
pub fn encode_message(msg: &Message, ts: u64) -> Result<Vec<u8>, WireError> {
    let payload = match msg {
        Message::Handshake(p) => to_value(p)?,
        Message::HandshakeAck(p) => to_value(p)?,
        Message::Error(p) => to_value(p)?,
        Message::Attach | Message::Detach => Value::Null,
        Message::Baseline(c) | Message::Push(c) => to_value(c)?,
        Message::Publish(c) => to_value(c)?,
        Message::PublishAck(p) => to_value(p)?,
    };
    let env = OpEnvelope {
        op: msg.op_name().to_string(),
        ts,
        payload,
    };
    encode_packet(&to_cbor(&env)?)
}

/// Decode bytes into (Message, ts, bytes_consumed).
pub fn decode_message(bytes: &[u8]) -> Result<(Message, u64, usize), WireError> {
    let (payload, used) = decode_packet(bytes)?;
    let env: OpEnvelope<Value> = from_cbor(payload)?;
    let p = &env.payload;
    let msg = match env.op.as_str() {
        "handshake" => Message::Handshake(from_value(p)?),
        "handshake_ack" => Message::HandshakeAck(from_value(p)?),
        "error" => Message::Error(from_value(p)?),
        "attach" => Message::Attach,
        "detach" => Message::Detach,
        "baseline" => Message::Baseline(from_value(p)?),
        "push" => Message::Push(from_value(p)?),
        "publish" => Message::Publish(from_value(p)?),
        "publish_ack" => Message::PublishAck(from_value::<PublishAckPayload>(p)?),
        other => return Err(WireError::UnknownOp(other.to_string())),
    };
    Ok((msg, env.ts, used))
}

/// Blocking read of one message from a stream.
///
/// Returns `Ok(None)` when the stream closes cleanly before a new packet
/// starts; a close mid-packet is an `UnexpectedEof` I/O error.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Option<(Message, u64)>, WireError> {
    let mut header = [0u8; HEADER_LEN];
    let mut read = 0;
    while read < HEADER_LEN {
        match reader.read(&mut header[read..]) {
            Ok(0) if read == 0 => return Ok(None),
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("truncated frame header: read {read} of {HEADER_LEN} bytes"),
                )
                .into())
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    let total = frame_len(&header)?.ok_or(WireError::Incomplete)?;
    let mut packet = vec![0u8; total];
    packet[..HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut packet[HEADER_LEN..])?;
    let (msg, ts, _) = decode_message(&packet)?;
    Ok(Some((msg, ts)))
}

// --- Unit tests -----------------------------------------------------------

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{ClientRole, ErrorPayload, HandshakePayload};
    use lipsync_core::{
        Command, KeyFramesOptions, MorphTimelineTable, MorphWeight, TimelineEntry,
        VersionedCommand, Viseme,
    };
    use std::io::Cursor;

    fn timeline_command() -> Command {
        let mut entry = TimelineEntry::new();
        entry.push(Viseme::A, 1.0).push(Viseme::Closed, 0.5);
        let table = MorphTimelineTable::from([("mouth_a".to_string(), entry)]);
        Command::key_frames_with(
            table,
            0.2,
            KeyFramesOptions {
                start_frame: Some(12),
                replace_existing: true,
            },
        )
        .unwrap()
    }

    #[test]
    fn header_layout_is_stable() {
        let pkt = encode_message(&Message::Attach, 7).unwrap();
        assert_eq!(hex::encode(&pkt[..8]), "4c53592100010000");
        let len = u32::from_be_bytes([pkt[8], pkt[9], pkt[10], pkt[11]]) as usize;
        assert_eq!(pkt.len(), HEADER_LEN + len + CHECKSUM_LEN);
    }

    #[test]
    fn push_carries_timeline_and_timestamp() {
        let msg = Message::Push(VersionedCommand::new(3, timeline_command()));
        let pkt = encode_message(&msg, 41).unwrap();
        let (decoded, ts, used) = decode_message(&pkt).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(ts, 41);
        assert_eq!(used, pkt.len());
    }

    #[test]
    fn decode_consumes_exactly_one_packet() {
        let mut buf = encode_message(
            &Message::Publish(Command::morph_weights(vec![MorphWeight::new("o", 0.5)])),
            0,
        )
        .unwrap();
        let first = buf.len();
        buf.extend(encode_message(&Message::Detach, 1).unwrap());
        let (msg, _, used) = decode_message(&buf).unwrap();
        assert_eq!(used, first);
        assert!(matches!(msg, Message::Publish(Command::MorphWeights(_))));
        let (msg, ts, _) = decode_message(&buf[used..]).unwrap();
        assert_eq!((msg, ts), (Message::Detach, 1));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut pkt = encode_message(
            &Message::Error(ErrorPayload::invalid_argument("unit_seconds")),
            2,
        )
        .unwrap();
        pkt[HEADER_LEN + 1] ^= 0xff;
        assert!(matches!(
            decode_message(&pkt),
            Err(WireError::ChecksumMismatch)
        ));
    }

    #[test]
    fn bad_headers_are_rejected_early() {
        assert!(matches!(frame_len(&[0u8; 4]), Ok(None)));
        assert!(matches!(frame_len(&[0u8; 12]), Err(WireError::BadMagic)));

        let mut pkt = encode_message(&Message::Attach, 0).unwrap();
        pkt[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            frame_len(&pkt),
            Err(WireError::PayloadTooLarge(_))
        ));

        let mut pkt = encode_message(&Message::Attach, 0).unwrap();
        pkt[5] = 9;
        assert!(matches!(
            frame_len(&pkt),
            Err(WireError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn unknown_ops_are_reported() {
        let env = OpEnvelope {
            op: "subscribe_everything".to_string(),
            ts: 0,
            payload: Value::Null,
        };
        let pkt = encode_packet(&to_cbor(&env).unwrap()).unwrap();
        assert!(matches!(
            decode_message(&pkt),
            Err(WireError::UnknownOp(op)) if op == "subscribe_everything"
        ));
    }

    #[test]
    fn payload_mismatching_its_op_is_a_decode_error() {
        let env = OpEnvelope {
            op: "push".to_string(),
            ts: 0,
            payload: Value::Text("not a command".into()),
        };
        let pkt = encode_packet(&to_cbor(&env).unwrap()).unwrap();
        assert!(matches!(decode_message(&pkt), Err(WireError::Decode(_))));
    }

    #[test]
    fn read_message_streams_until_clean_eof() {
        let hello = Message::Handshake(HandshakePayload {
            agent_id: Some("host".into()),
            role: ClientRole::Consumer,
            client_version: 1,
        });
        let mut bytes = encode_message(&hello, 0).unwrap();
        bytes.extend(encode_message(&Message::Attach, 1).unwrap());
        let mut cursor = Cursor::new(bytes);

        assert_eq!(read_message(&mut cursor).unwrap(), Some((hello, 0)));
        assert_eq!(read_message(&mut cursor).unwrap(), Some((Message::Attach, 1)));
        assert_eq!(read_message(&mut cursor).unwrap(), None);
    }

    #[test]
    fn read_message_flags_truncation() {
        let bytes = encode_message(&Message::Attach, 0).unwrap();
        let mut cursor = Cursor::new(bytes[..5].to_vec());
        assert!(matches!(read_message(&mut cursor), Err(WireError::Io(_))));
    }
}

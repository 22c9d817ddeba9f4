// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Minimal async client over the hub's Unix socket.

use lipsync_core::Command;
use lipsync_proto::wire::{decode_message, encode_message, frame_len, HEADER_LEN};
use lipsync_proto::{ClientRole, HandshakePayload, Message};
use std::io;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use crate::{ClientError, CLIENT_VERSION};

/// Async hub client, mainly for producers.
pub struct HubClient {
    stream: UnixStream,
    agent_id: Option<String>,
}

impl HubClient {
    /// Connect to the hub at the given Unix socket path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(ClientError::TransportUnavailable)?;
        Ok(Self {
            stream,
            agent_id: None,
        })
    }

    /// Agent id sent with the next handshake.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Write one message.
    pub async fn send(&mut self, msg: &Message) -> Result<(), ClientError> {
        let pkt = encode_message(msg, 0)?;
        self.stream
            .write_all(&pkt)
            .await
            .map_err(ClientError::TransportUnavailable)
    }

    /// Send a handshake declaring `role`. The ack arrives via
    /// [`poll_message`](Self::poll_message).
    pub async fn send_handshake(&mut self, role: ClientRole) -> Result<(), ClientError> {
        let hello = Message::Handshake(HandshakePayload {
            agent_id: self.agent_id.clone(),
            role,
            client_version: CLIENT_VERSION,
        });
        self.send(&hello).await
    }

    /// Ask for the baseline and subsequent pushes.
    pub async fn attach(&mut self) -> Result<(), ClientError> {
        self.send(&Message::Attach).await
    }

    /// Stop receiving pushes; the connection stays open.
    pub async fn detach(&mut self) -> Result<(), ClientError> {
        self.send(&Message::Detach).await
    }

    /// Publish `command` and wait for the version the hub stored it under.
    ///
    /// Messages other than the reply (handshake acks, pushes) that arrive
    /// first are discarded, so producers should not also attach on the same
    /// connection.
    pub async fn publish(&mut self, command: Command) -> Result<u64, ClientError> {
        self.send(&Message::Publish(command)).await?;
        loop {
            match self.poll_message().await? {
                Some(Message::PublishAck(ack)) => return Ok(ack.version),
                Some(Message::Error(err)) => return Err(ClientError::Rejected(err)),
                Some(other) => debug!(op = other.op_name(), "skipping while awaiting publish_ack"),
                None => return Err(ClientError::Protocol("hub closed before publish_ack".into())),
            }
        }
    }

    /// Read one message. Returns `Ok(None)` when the stream closes before any
    /// bytes of a new packet arrive.
    ///
    /// Reads until a full frame header is buffered so short reads cannot
    /// desynchronize framing.
    pub async fn poll_message(&mut self) -> Result<Option<Message>, ClientError> {
        let mut header = [0u8; HEADER_LEN];
        let mut read = 0usize;
        while read < header.len() {
            let n = self
                .stream
                .read(&mut header[read..])
                .await
                .map_err(ClientError::TransportUnavailable)?;
            if n == 0 {
                if read == 0 {
                    return Ok(None);
                }
                return Err(ClientError::TransportUnavailable(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("truncated frame header: read {read} of {HEADER_LEN} bytes"),
                )));
            }
            read += n;
        }
        let total = frame_len(&header)?.unwrap_or(HEADER_LEN);
        let mut packet = vec![0u8; total];
        packet[..HEADER_LEN].copy_from_slice(&header);
        self.stream
            .read_exact(&mut packet[HEADER_LEN..])
            .await
            .map_err(ClientError::TransportUnavailable)?;
        let (msg, _ts, _) = decode_message(&packet)?;
        Ok(Some(msg))
    }

    /// Expose the underlying stream (e.g., for `select!`).
    pub fn stream(&mut self) -> &mut UnixStream {
        &mut self.stream
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Unix-socket front end for [`Hub`].
//!
//! Each accepted connection gets a reader loop (this task) and a writer task
//! draining the connection's bounded outbox. The hub owns the only sender, so
//! when it evicts a connection the writer drains what is queued and shuts the
//! socket down; the peer sees end of stream and must attach again.

use lipsync_proto::wire::{decode_message, frame_len, WireError};
use lipsync_proto::{
    AckStatus, ClientRole, ErrorPayload, HandshakeAckPayload, Message, PublishAckPayload,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::{ClientId, Hub, HubError};

/// Hub implementation version reported in handshake acks.
pub const SERVER_VERSION: u32 = 1;

/// Errors raised while binding or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Another hub already answers on this path.
    #[error("a hub is already listening at {}", .0.display())]
    AlreadyRunning(PathBuf),
    /// Socket I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A packet could not be framed or decoded.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The hub dropped this connection.
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Bind `path`, refusing to steal it from a live hub.
///
/// A socket file nobody answers on is left over from a crashed hub and is
/// removed before binding.
pub async fn bind_exclusive(path: impl AsRef<Path>) -> Result<UnixListener, ServerError> {
    let path = path.as_ref();
    if UnixStream::connect(path).await.is_ok() {
        return Err(ServerError::AlreadyRunning(path.to_path_buf()));
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale socket"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "hub listening");
    Ok(listener)
}

/// Accept connections forever, one task per connection.
pub async fn serve(
    listener: UnixListener,
    hub: Arc<Hub>,
    outbox_capacity: usize,
) -> Result<(), ServerError> {
    loop {
        let (stream, _) = listener.accept().await?;
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, &hub, outbox_capacity).await {
                warn!(%err, "client handler error");
            }
        });
    }
}

/// What the reader loop should do after a message.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

async fn handle_client(
    stream: UnixStream,
    hub: &Hub,
    outbox_capacity: usize,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(outbox_capacity.max(1));
    let conn_id = hub.connect(tx);
    debug!(client = conn_id, "connected");

    tokio::spawn(async move {
        while let Some(buf) = rx.recv().await {
            if writer.write_all(&buf).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let result = read_loop(&mut reader, conn_id, hub).await;
    hub.disconnect(conn_id);
    debug!(client = conn_id, "disconnected");
    result
}

async fn read_loop(
    reader: &mut (impl AsyncReadExt + Unpin),
    conn_id: ClientId,
    hub: &Hub,
) -> Result<(), ServerError> {
    let mut read_buf = vec![0u8; 16 * 1024];
    let mut acc: Vec<u8> = Vec::with_capacity(32 * 1024);
    loop {
        let n = reader.read(&mut read_buf).await?;
        if n == 0 {
            return Ok(());
        }
        acc.extend_from_slice(&read_buf[..n]);

        loop {
            let total = match frame_len(&acc) {
                Ok(Some(total)) if acc.len() >= total => total,
                Ok(_) => break,
                Err(err) => {
                    reject(hub, conn_id, &err);
                    return Err(err.into());
                }
            };
            let packet: Vec<u8> = acc.drain(..total).collect();
            let msg = match decode_message(&packet) {
                Ok((msg, _ts, _used)) => msg,
                Err(err) => {
                    reject(hub, conn_id, &err);
                    return Err(err.into());
                }
            };
            if handle_message(msg, conn_id, hub)? == Flow::Close {
                return Ok(());
            }
        }
    }
}

/// Best-effort error reply before dropping a connection that sent garbage.
fn reject(hub: &Hub, conn_id: ClientId, err: &WireError) {
    warn!(client = conn_id, %err, "undecodable packet; dropping connection");
    let _ = hub.send(
        conn_id,
        &Message::Error(ErrorPayload::bad_payload(err.to_string())),
    );
}

/// Handle one inbound message from `conn_id`.
fn handle_message(msg: Message, conn_id: ClientId, hub: &Hub) -> Result<Flow, ServerError> {
    match msg {
        Message::Handshake(hs) => {
            debug!(client = conn_id, agent = ?hs.agent_id, role = ?hs.role, "handshake");
            hub.identify(conn_id, hs.agent_id, hs.role);
            hub.send(
                conn_id,
                &Message::HandshakeAck(HandshakeAckPayload {
                    status: AckStatus::Ok,
                    server_version: SERVER_VERSION,
                    session_id: conn_id.to_string(),
                    error: None,
                }),
            )?;
        }
        Message::Attach => {
            hub.attach(conn_id)?;
        }
        Message::Detach => hub.detach(conn_id),
        Message::Publish(command) => {
            if hub.role_of(conn_id) == Some(ClientRole::Consumer) {
                return refuse(hub, conn_id, "consumers may not publish");
            }
            let reply = match hub.publish(command) {
                Ok(version) => Message::PublishAck(PublishAckPayload { version }),
                Err(err) => {
                    warn!(client = conn_id, %err, "publish rejected");
                    Message::Error(ErrorPayload::invalid_argument(err.to_string()))
                }
            };
            hub.send(conn_id, &reply)?;
        }
        other @ (Message::HandshakeAck(_)
        | Message::Error(_)
        | Message::Baseline(_)
        | Message::Push(_)
        | Message::PublishAck(_)) => {
            return refuse(
                hub,
                conn_id,
                &format!("op '{}' is hub-to-client only", other.op_name()),
            );
        }
    }
    Ok(Flow::Continue)
}

fn refuse(hub: &Hub, conn_id: ClientId, why: &str) -> Result<Flow, ServerError> {
    warn!(client = conn_id, why, "protocol violation; dropping connection");
    hub.send(conn_id, &Message::Error(ErrorPayload::invalid_op(why)))?;
    Ok(Flow::Close)
}

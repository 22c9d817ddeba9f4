// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Blocking consumer attachment for animation hosts.
//!
//! The connect, handshake and baseline exchange happen synchronously so the
//! host can surface a missing hub immediately. After that a background thread
//! reads pushes into a [`CommandQueue`] that the host drains on its own tick.

use lipsync_core::VersionedCommand;
use lipsync_proto::wire::{encode_message, read_message, WireError};
use lipsync_proto::{AckStatus, ClientRole, HandshakePayload, Message};
use std::io::{self, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::queue::CommandQueue;
use crate::tick::CommandSource;
use crate::{ClientError, CLIENT_VERSION};

/// How long to wait for the hub's baseline after attaching.
pub const BASELINE_TIMEOUT: Duration = Duration::from_secs(5);

struct Channel {
    stream: UnixStream,
    reader: JoinHandle<()>,
    connected: Arc<AtomicBool>,
}

/// Consumer attachment: the latest baseline plus a queue of later pushes.
///
/// Dropping the client detaches it.
pub struct CommandClient {
    path: PathBuf,
    agent_id: Option<String>,
    queue: CommandQueue,
    baseline: VersionedCommand,
    channel: Option<Channel>,
}

impl CommandClient {
    /// Connect to the hub at `path`, attach, and wait for the baseline.
    ///
    /// The baseline is also the first entry of the queue, so a host that only
    /// ever dequeues still starts from the hub's current command.
    pub fn attach(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        Self::attach_as(path, None)
    }

    /// [`attach`](Self::attach) with an agent id shown in hub logs.
    pub fn attach_as(path: impl AsRef<Path>, agent_id: Option<String>) -> Result<Self, ClientError> {
        let mut client = Self {
            path: path.as_ref().to_path_buf(),
            agent_id,
            queue: CommandQueue::new(),
            baseline: VersionedCommand::default(),
            channel: None,
        };
        client.open()?;
        Ok(client)
    }

    fn open(&mut self) -> Result<(), ClientError> {
        let mut stream =
            UnixStream::connect(&self.path).map_err(ClientError::TransportUnavailable)?;
        stream
            .set_read_timeout(Some(BASELINE_TIMEOUT))
            .map_err(ClientError::TransportUnavailable)?;

        let hello = Message::Handshake(HandshakePayload {
            agent_id: self.agent_id.clone(),
            role: ClientRole::Consumer,
            client_version: CLIENT_VERSION,
        });
        write_message(&mut stream, &hello)?;
        write_message(&mut stream, &Message::Attach)?;

        let baseline = loop {
            match read_message(&mut stream).map_err(transport)? {
                Some((Message::HandshakeAck(ack), _)) if ack.status == AckStatus::Ok => {}
                Some((Message::HandshakeAck(ack), _)) => {
                    return Err(match ack.error {
                        Some(err) => ClientError::Rejected(err),
                        None => ClientError::Protocol("handshake refused".into()),
                    });
                }
                Some((Message::Baseline(vc), _)) => break vc,
                Some((Message::Error(err), _)) => return Err(ClientError::Rejected(err)),
                Some((other, _)) => {
                    return Err(ClientError::Protocol(format!(
                        "expected baseline, got '{}'",
                        other.op_name()
                    )));
                }
                None => {
                    return Err(ClientError::Protocol("hub closed before baseline".into()));
                }
            }
        };
        stream
            .set_read_timeout(None)
            .map_err(ClientError::TransportUnavailable)?;
        debug!(version = baseline.version, "attached");

        self.queue.on_push(baseline.clone());
        self.baseline = baseline;

        let connected = Arc::new(AtomicBool::new(true));
        let reader_stream = stream
            .try_clone()
            .map_err(ClientError::TransportUnavailable)?;
        let reader = spawn_reader(reader_stream, self.queue.clone(), Arc::clone(&connected));
        self.channel = Some(Channel {
            stream,
            reader,
            connected,
        });
        Ok(())
    }

    fn close(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };
        let _ = write_message(&mut channel.stream, &Message::Detach);
        let _ = channel.stream.shutdown(Shutdown::Both);
        if channel.reader.join().is_err() {
            warn!("push reader panicked");
        }
    }

    /// Command the hub held when this attachment started.
    pub fn baseline(&self) -> &VersionedCommand {
        &self.baseline
    }

    /// Oldest buffered command, without waiting.
    pub fn dequeue(&self) -> Option<VersionedCommand> {
        self.queue.dequeue()
    }

    /// Drop all buffered commands.
    pub fn clear(&self) {
        self.queue.clear();
    }

    /// Handle onto the push queue.
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Whether the push channel is still open. Turns false when the hub goes
    /// away or drops this client for falling behind.
    pub fn is_connected(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|c| c.connected.load(Ordering::Acquire))
    }

    /// Tear down the current attachment and attach again.
    ///
    /// Commands buffered from the old attachment are discarded; the queue
    /// restarts with the new baseline under a new attachment number, so a
    /// [`TickDriver`](crate::TickDriver) applies it even when the hub came
    /// back with lower versions. On failure the client stays detached
    /// and may be re-attached later.
    pub fn reattach(&mut self) -> Result<(), ClientError> {
        if self.queue.is_disposed() {
            return Err(ClientError::Protocol("client was disposed".into()));
        }
        self.close();
        self.queue.restart();
        self.open()
    }

    /// Detach and close. Idempotent.
    pub fn dispose(&mut self) {
        self.close();
        self.queue.dispose();
    }
}

impl CommandSource for CommandClient {
    fn next_command(&mut self) -> Option<VersionedCommand> {
        self.dequeue()
    }

    fn next_attached(&mut self) -> Option<(u64, VersionedCommand)> {
        self.queue.dequeue_attached()
    }
}

impl Drop for CommandClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn write_message(stream: &mut UnixStream, msg: &Message) -> Result<(), ClientError> {
    let pkt = encode_message(msg, 0)?;
    stream
        .write_all(&pkt)
        .map_err(ClientError::TransportUnavailable)
}

fn transport(err: WireError) -> ClientError {
    match err {
        WireError::Io(io) => ClientError::TransportUnavailable(io),
        other => ClientError::Wire(other),
    }
}

fn spawn_reader(
    mut stream: UnixStream,
    queue: CommandQueue,
    connected: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match read_message(&mut stream) {
                Ok(Some((Message::Push(vc) | Message::Baseline(vc), _))) => {
                    if !queue.on_push(vc) {
                        break;
                    }
                }
                Ok(Some((Message::Error(err), _))) => {
                    warn!(name = %err.name, message = %err.message, "hub reported an error");
                }
                Ok(Some((other, _))) => debug!(op = other.op_name(), "ignoring message"),
                Ok(None) => {
                    debug!("hub closed the push channel");
                    break;
                }
                Err(WireError::Io(err)) if is_local_close(&err) => break,
                Err(err) => {
                    warn!(%err, "push channel failed");
                    break;
                }
            }
        }
        connected.store(false, Ordering::Release);
    })
}

fn is_local_close(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::NotConnected
    )
}

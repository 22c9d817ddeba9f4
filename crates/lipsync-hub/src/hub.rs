// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Command hub: the store plus push fan-out to attached connections.
//!
//! Every packet bound for a connection is enqueued on that connection's
//! outbox while the hub's connection table is locked, and pushes are enqueued
//! while the store slot is still held. Together this makes the order of
//! pushes seen by one connection equal the order replacements completed, and
//! keeps envelope timestamps strictly increasing per connection.
//!
//! Lock order is always store slot → connection table.

use lipsync_core::{
    Command, CommandError, KeyFramesOptions, MorphTimelineTable, MorphWeight, VersionedCommand,
};
use lipsync_proto::wire::{encode_message, to_cbor, WireError, MAX_PAYLOAD};
use lipsync_proto::{ClientRole, Message};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};

use crate::store::CommandStore;

/// Hub-local connection identifier.
pub type ClientId = u64;

/// Encoded packets waiting to be written to one connection.
pub type Outbox = Sender<Vec<u8>>;

/// Headroom reserved for the envelope around a pushed command.
const ENVELOPE_SLACK: usize = 1024;

/// Failure to deliver to one connection. Never affects other connections.
#[derive(Debug, Error)]
pub enum HubError {
    /// The connection is gone (never registered, dropped, or evicted).
    #[error("client {0} is not connected")]
    Disconnected(ClientId),
    /// The message could not be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),
}

struct Conn {
    outbox: Outbox,
    attached: bool,
    agent: Option<String>,
    role: Option<ClientRole>,
}

#[derive(Default)]
struct ConnTable {
    next_id: ClientId,
    next_ts: u64,
    conns: HashMap<ClientId, Conn>,
}

impl ConnTable {
    fn alloc_ts(&mut self) -> u64 {
        let t = self.next_ts;
        self.next_ts += 1;
        t
    }

    /// Enqueue without waiting. A closed or full outbox evicts the connection.
    fn deliver(&mut self, id: ClientId, pkt: Vec<u8>) -> Result<(), HubError> {
        let conn = self.conns.get(&id).ok_or(HubError::Disconnected(id))?;
        match conn.outbox.try_send(pkt) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(client = id, agent = ?conn.agent, "outbox full; dropping slow client");
                self.conns.remove(&id);
                Err(HubError::Disconnected(id))
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client = id, "outbox closed; dropping client");
                self.conns.remove(&id);
                Err(HubError::Disconnected(id))
            }
        }
    }
}

/// Versioned command store with push fan-out.
pub struct Hub {
    store: CommandStore,
    conns: Mutex<ConnTable>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    /// Hub at version 0 with no connections.
    pub fn new() -> Self {
        Self {
            store: CommandStore::new(),
            conns: Mutex::new(ConnTable::default()),
        }
    }

    fn conns(&self) -> MutexGuard<'_, ConnTable> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- producer side ----------------------------------------------------

    /// Store a weight snapshot (blank morph names dropped) and push it.
    /// A snapshot too large for one packet leaves the store untouched.
    pub fn set_morph_weights_command(
        &self,
        weights: Vec<MorphWeight>,
    ) -> Result<u64, CommandError> {
        self.publish(Command::morph_weights(weights))
    }

    /// Store a timeline with default options and push it.
    pub fn set_key_frames_command(
        &self,
        table: MorphTimelineTable,
        unit_seconds: f64,
    ) -> Result<u64, CommandError> {
        self.set_key_frames_command_with(table, unit_seconds, KeyFramesOptions::default())
    }

    /// Store a timeline and push it. Invalid input leaves the store untouched.
    pub fn set_key_frames_command_with(
        &self,
        table: MorphTimelineTable,
        unit_seconds: f64,
        options: KeyFramesOptions,
    ) -> Result<u64, CommandError> {
        self.publish(Command::key_frames_with(table, unit_seconds, options)?)
    }

    /// Validate and store a command built elsewhere (e.g. received over the
    /// wire), then push it.
    pub fn publish(&self, command: Command) -> Result<u64, CommandError> {
        let command = command.normalized()?;
        let size = to_cbor(&command)
            .map_err(|e| CommandError::InvalidArgument(e.to_string()))?
            .len();
        if size + ENVELOPE_SLACK > MAX_PAYLOAD {
            return Err(CommandError::InvalidArgument(format!(
                "command of {size} bytes does not fit in one packet"
            )));
        }
        Ok(self.replace(command))
    }

    /// Current command and version.
    pub fn current(&self) -> VersionedCommand {
        self.store.current()
    }

    fn replace(&self, command: Command) -> u64 {
        let kind = command.kind();
        let (version, delivered) = self.store.replace_with(command, |current| {
            let mut table = self.conns();
            let targets: Vec<ClientId> = table
                .conns
                .iter()
                .filter(|(_, c)| c.attached)
                .map(|(&id, _)| id)
                .collect();
            if targets.is_empty() {
                return 0;
            }
            let ts = table.alloc_ts();
            let pkt = match encode_message(&Message::Push(current.clone()), ts) {
                Ok(pkt) => pkt,
                Err(err) => {
                    error!(%err, version = current.version, "failed to encode push");
                    return 0;
                }
            };
            targets
                .into_iter()
                .filter(|&id| table.deliver(id, pkt.clone()).is_ok())
                .count()
        });
        info!(version, ?kind, delivered, "command replaced");
        version
    }

    // --- connection side --------------------------------------------------

    /// Register a connection's outbox. It receives nothing until it attaches.
    pub fn connect(&self, outbox: Outbox) -> ClientId {
        let mut table = self.conns();
        let id = table.next_id;
        table.next_id += 1;
        table.conns.insert(
            id,
            Conn {
                outbox,
                attached: false,
                agent: None,
                role: None,
            },
        );
        id
    }

    /// Record what a connection said about itself in its handshake.
    pub fn identify(&self, id: ClientId, agent: Option<String>, role: ClientRole) {
        if let Some(conn) = self.conns().conns.get_mut(&id) {
            conn.agent = agent;
            conn.role = Some(role);
        }
    }

    /// Make `id` a push target and enqueue the current command as its
    /// baseline. Attaching again re-sends the baseline.
    pub fn attach(&self, id: ClientId) -> Result<VersionedCommand, HubError> {
        self.store.observe(|current| {
            let mut table = self.conns();
            let conn = table
                .conns
                .get_mut(&id)
                .ok_or(HubError::Disconnected(id))?;
            conn.attached = true;
            let ts = table.alloc_ts();
            let pkt = encode_message(&Message::Baseline(current.clone()), ts)?;
            table.deliver(id, pkt)?;
            debug!(client = id, version = current.version, "attached");
            Ok(current.clone())
        })
    }

    /// Stop pushing to `id`. Idempotent; unknown ids are ignored.
    pub fn detach(&self, id: ClientId) {
        if let Some(conn) = self.conns().conns.get_mut(&id) {
            conn.attached = false;
        }
    }

    /// Forget a connection entirely (its outbox is dropped).
    pub fn disconnect(&self, id: ClientId) {
        self.conns().conns.remove(&id);
    }

    /// Enqueue a direct reply to one connection.
    pub fn send(&self, id: ClientId, msg: &Message) -> Result<(), HubError> {
        let mut table = self.conns();
        let ts = table.alloc_ts();
        let pkt = encode_message(msg, ts)?;
        table.deliver(id, pkt)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.conns().conns.len()
    }

    /// Number of connections currently receiving pushes.
    pub fn attached_count(&self) -> usize {
        self.conns().conns.values().filter(|c| c.attached).count()
    }

    /// Role declared by a connection, if it completed a handshake.
    pub fn role_of(&self, id: ClientId) -> Option<ClientRole> {
        self.conns().conns.get(&id).and_then(|c| c.role)
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Clients for the lip-sync command hub.
//!
//! * [`CommandClient`]: blocking consumer attachment feeding a [`CommandQueue`].
//! * [`HubClient`]: async client for producers (and tools).
//! * [`TickDriver`]: applies queued commands to an animation host, one per tick.

use lipsync_proto::wire::WireError;
use lipsync_proto::ErrorPayload;
use std::io;
use thiserror::Error;

pub mod attach;
pub mod queue;
pub mod session;
pub mod tick;

pub use attach::CommandClient;
pub use queue::CommandQueue;
pub use session::HubClient;
pub use tick::{CommandSource, TickDriver, TickError, TickOutcome};

/// Client implementation version sent in handshakes.
pub const CLIENT_VERSION: u32 = 1;

/// Errors surfaced by the hub clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The hub endpoint cannot be reached, or the connection broke.
    #[error("hub transport unavailable: {0}")]
    TransportUnavailable(#[source] io::Error),
    /// A packet could not be encoded or decoded.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The hub answered with an error.
    #[error("hub rejected request: {} ({})", .0.message, .0.name)]
    Rejected(ErrorPayload),
    /// The hub sent something out of sequence.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether the hub refused the command's inputs (the store is unchanged).
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ClientError::Rejected(err) if err.is_invalid_argument())
    }
}

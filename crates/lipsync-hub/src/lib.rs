// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Lip-sync command hub.
//!
//! Holds the single current command ([`store::CommandStore`]), pushes every
//! replacement to attached animation hosts ([`hub::Hub`]) and serves the
//! whole thing over a Unix socket ([`server`]).

pub mod hub;
pub mod prefs;
pub mod server;
pub mod store;

pub use hub::{ClientId, Hub, HubError, Outbox};
pub use prefs::{HubPrefs, HUB_PREFS_KEY};
pub use server::{bind_exclusive, serve, ServerError};
pub use store::CommandStore;

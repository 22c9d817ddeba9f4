// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for lip-sync hub crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`host`] - Recording animation host with failure injection
//! - [`timeline`] - Builders for morph timeline tables and commands

pub mod config;
pub mod host;
pub mod timeline;

pub use config::InMemoryConfigStore;
pub use host::{FakeHost, HostOp};
pub use timeline::TimelineBuilder;

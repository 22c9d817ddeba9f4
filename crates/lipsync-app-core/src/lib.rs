// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for the lip-sync hub and hosts (config, prefs).
//! Keeps binaries and host adapters thin and storage-agnostic.

pub mod config;
pub mod prefs;

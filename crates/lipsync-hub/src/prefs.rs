// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Hub preferences persisted through the config service.

use lipsync_proto::default_socket_path;
use serde::{Deserialize, Serialize};

/// Config key under which [`HubPrefs`] are stored.
pub const HUB_PREFS_KEY: &str = "lipsync_hub";

/// Packets buffered per connection before the hub gives up on it.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Where the hub listens and how much it buffers per client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HubPrefs {
    /// Unix socket path.
    pub socket_path: String,
    /// Bounded outbox size; a client that falls this far behind is detached.
    pub outbox_capacity: usize,
}

impl Default for HubPrefs {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path().display().to_string(),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let prefs: HubPrefs = serde_json::from_str(r#"{"outbox_capacity": 8}"#).unwrap();
        assert_eq!(prefs.outbox_capacity, 8);
        assert_eq!(prefs.socket_path, HubPrefs::default().socket_path);
    }
}

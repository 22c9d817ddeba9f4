// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Host-side scheduling preferences.

use lipsync_core::{RangePolicy, VisemeWeights};
use serde::{Deserialize, Serialize};

/// Config key under which [`SchedulePrefs`] are stored.
pub const SCHEDULE_PREFS_KEY: &str = "lipsync_schedule";

/// How an animation host turns received timelines into keyframes.
///
/// Missing fields in a stored file fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulePrefs {
    /// Scene frame rate used when the host cannot report its own.
    pub frames_per_second: f64,
    /// Replacement range policy for `replace_existing` timelines.
    pub range_policy: RangePolicy,
    /// Default target weight of each open viseme.
    pub viseme_weights: VisemeWeights,
}

impl Default for SchedulePrefs {
    fn default() -> Self {
        Self {
            frames_per_second: 30.0,
            range_policy: RangePolicy::default(),
            viseme_weights: VisemeWeights::default(),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Keyframe track port implemented by animation hosts.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::{FrameRange, Keyframe};

/// Error reported by a host while writing keyframes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    /// The host refused the keyframe (unknown morph, frame out of range, ...).
    #[error("keyframe rejected: {0}")]
    Rejected(String),
    /// A backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Narrow read/write contract onto a host's morph keyframe storage.
///
/// The host owns the track. The scheduler only reads it through
/// [`existing_weight`](Self::existing_weight); a [`KeyframeSchedule`] writes
/// through the two mutating calls.
///
/// [`KeyframeSchedule`]: crate::KeyframeSchedule
pub trait KeyframeTrack {
    /// Weight the track holds for `morph` at `frame`; 0 where nothing is keyed.
    fn existing_weight(&self, morph: &str, frame: i64) -> f32;

    /// Delete the keyframes of `morph` inside `range`, returning how many went.
    fn remove_keyframes(&mut self, morph: &str, range: FrameRange) -> Result<usize, TrackError>;

    /// Insert a keyframe; an existing key at the same (morph, frame) is overwritten.
    fn insert_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), TrackError>;
}

/// Full host contract used by the per-tick command driver: keyframe storage
/// plus the playhead and direct morph weights.
///
/// Writes are not transactional. If one call fails, earlier calls for the
/// same command have already taken effect; undoing them is up to the host.
pub trait AnimationHost: KeyframeTrack {
    /// Frame under the playhead; timelines without a start frame begin here.
    fn current_frame(&self) -> i64;

    /// Scene frame rate used to convert timeline seconds into frames.
    fn frames_per_second(&self) -> f64;

    /// Set a morph weight immediately (weight snapshot commands).
    fn set_morph_weight(&mut self, morph: &str, weight: f32) -> Result<(), TrackError>;
}

/// Counts from applying a schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Keyframes deleted by the replacement pass.
    pub removed: usize,
    /// Keyframes inserted.
    pub inserted: usize,
}

/// In-memory step-hold track: a morph holds the weight of its latest keyframe
/// at or before a frame, and 0 before its first keyframe.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrack {
    morphs: BTreeMap<String, BTreeMap<i64, f32>>,
}

impl MemoryTrack {
    /// Empty track.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a keyframe directly.
    pub fn set(&mut self, morph: &str, frame: i64, weight: f32) {
        self.morphs
            .entry(morph.to_string())
            .or_default()
            .insert(frame, weight);
    }

    /// Keyframes of `morph`, frame ascending.
    pub fn keys(&self, morph: &str) -> Vec<(i64, f32)> {
        self.morphs
            .get(morph)
            .map(|keys| keys.iter().map(|(&f, &w)| (f, w)).collect())
            .unwrap_or_default()
    }

    /// Morph names with at least one keyframe.
    pub fn morphs(&self) -> impl Iterator<Item = &str> + '_ {
        self.morphs
            .iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// Total keyframe count.
    pub fn len(&self) -> usize {
        self.morphs.values().map(BTreeMap::len).sum()
    }

    /// Whether the track holds no keyframes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyframeTrack for MemoryTrack {
    fn existing_weight(&self, morph: &str, frame: i64) -> f32 {
        self.morphs
            .get(morph)
            .and_then(|keys| keys.range(..=frame).next_back())
            .map_or(0.0, |(_, &w)| w)
    }

    fn remove_keyframes(&mut self, morph: &str, range: FrameRange) -> Result<usize, TrackError> {
        let Some(keys) = self.morphs.get_mut(morph) else {
            return Ok(0);
        };
        if range.start > range.end {
            return Ok(0);
        }
        let doomed: Vec<i64> = keys
            .range(range.start..=range.end)
            .map(|(&f, _)| f)
            .collect();
        for frame in &doomed {
            keys.remove(frame);
        }
        Ok(doomed.len())
    }

    fn insert_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), TrackError> {
        self.set(&keyframe.morph, keyframe.frame, keyframe.weight);
        Ok(())
    }
}

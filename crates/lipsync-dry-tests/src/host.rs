// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Recording animation host for driver and scheduler tests.

use lipsync_core::{
    AnimationHost, FrameRange, Keyframe, KeyframeTrack, MemoryTrack, TrackError,
};
use std::collections::BTreeMap;

/// One mutating call observed by [`FakeHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    /// `remove_keyframes(morph, range)` removed `count` keys.
    Removed {
        /// Morph cleared.
        morph: String,
        /// Range cleared.
        range: FrameRange,
        /// Keys actually deleted.
        count: usize,
    },
    /// `insert_keyframe` call.
    Inserted(Keyframe),
    /// `set_morph_weight(morph, weight)` call.
    Weight(String, f32),
}

/// Animation host fake backed by a [`MemoryTrack`].
///
/// Records every mutating call in order and can be told to reject writes for
/// one morph.
#[derive(Debug, Clone)]
pub struct FakeHost {
    /// Keyframe storage.
    pub track: MemoryTrack,
    /// Playhead.
    pub frame: i64,
    /// Scene frame rate.
    pub fps: f64,
    /// Current direct morph weights.
    pub weights: BTreeMap<String, f32>,
    ops: Vec<HostOp>,
    reject: Option<String>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            track: MemoryTrack::new(),
            frame: 0,
            fps: 30.0,
            weights: BTreeMap::new(),
            ops: Vec::new(),
            reject: None,
        }
    }
}

impl FakeHost {
    /// Host at frame 0, 30 fps, empty track.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with the given playhead and frame rate.
    pub fn at(frame: i64, fps: f64) -> Self {
        Self {
            frame,
            fps,
            ..Self::default()
        }
    }

    /// Reject every keyframe or weight write touching `morph`.
    pub fn reject_morph(&mut self, morph: &str) {
        self.reject = Some(morph.to_string());
    }

    /// Mutating calls in the order they happened.
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Forget recorded calls (track contents are kept).
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    fn check(&self, morph: &str) -> Result<(), TrackError> {
        match &self.reject {
            Some(r) if r == morph => Err(TrackError::Rejected(format!("morph {morph} is locked"))),
            _ => Ok(()),
        }
    }
}

impl KeyframeTrack for FakeHost {
    fn existing_weight(&self, morph: &str, frame: i64) -> f32 {
        self.track.existing_weight(morph, frame)
    }

    fn remove_keyframes(&mut self, morph: &str, range: FrameRange) -> Result<usize, TrackError> {
        self.check(morph)?;
        let count = self.track.remove_keyframes(morph, range)?;
        self.ops.push(HostOp::Removed {
            morph: morph.to_string(),
            range,
            count,
        });
        Ok(count)
    }

    fn insert_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), TrackError> {
        self.check(&keyframe.morph)?;
        self.track.insert_keyframe(keyframe)?;
        self.ops.push(HostOp::Inserted(keyframe.clone()));
        Ok(())
    }
}

impl AnimationHost for FakeHost {
    fn current_frame(&self) -> i64 {
        self.frame
    }

    fn frames_per_second(&self) -> f64 {
        self.fps
    }

    fn set_morph_weight(&mut self, morph: &str, weight: f32) -> Result<(), TrackError> {
        self.check(morph)?;
        self.weights.insert(morph.to_string(), weight);
        self.ops.push(HostOp::Weight(morph.to_string(), weight));
        Ok(())
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Keyframe scheduler: symbolic viseme timelines → frame-indexed keyframes.
//!
//! # Algorithm
//!
//! For each morph (sorted by name) the scheduler walks the viseme steps,
//! accumulating elapsed units from 0. A step starting at `elapsed` units lands
//! on frame `start_frame + round(elapsed * unit_seconds * fps)` and emits one
//! keyframe holding the step's target weight. A leading `Closed` step on
//! `start_frame` is dropped when the host already reports weight 0 there.
//!
//! The schedule also carries the frame range that a replacing apply clears
//! first. How that range is derived is selected by [`RangePolicy`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::command::{CommandError, KeyFramesCommand};
use crate::model::{FrameRange, Keyframe, MorphTimelineTable, Viseme, VisemeWeights};
use crate::track::{ApplyReport, KeyframeTrack, TrackError};

/// How the replacement range of a schedule is derived.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RangePolicy {
    /// `[min, max]` over the keyframes actually generated; only morphs that
    /// produced keyframes are cleared. An elided step can narrow the range.
    #[default]
    GeneratedKeyframes,
    /// From `start_frame` to the frame where the longest timeline ends; every
    /// non-empty morph of the command is cleared, even if all its steps were
    /// elided.
    TimelineSpan,
}

/// Validated scheduler inputs.
#[derive(Debug, Clone)]
pub struct ScheduleRequest<'a> {
    table: &'a MorphTimelineTable,
    unit_seconds: f64,
    frames_per_second: f64,
    start_frame: i64,
    replace_existing: bool,
    weights: VisemeWeights,
    range_policy: RangePolicy,
}

impl<'a> ScheduleRequest<'a> {
    /// Build a request; both rates must be positive and finite, and every
    /// timeline must end on a frame representable as `i64`.
    pub fn new(
        table: &'a MorphTimelineTable,
        unit_seconds: f64,
        frames_per_second: f64,
        start_frame: i64,
    ) -> Result<Self, CommandError> {
        if !(unit_seconds.is_finite() && unit_seconds > 0.0) {
            return Err(CommandError::InvalidArgument(format!(
                "unit_seconds must be positive, got {unit_seconds}"
            )));
        }
        if !(frames_per_second.is_finite() && frames_per_second > 0.0) {
            return Err(CommandError::InvalidArgument(format!(
                "frames_per_second must be positive, got {frames_per_second}"
            )));
        }
        let request = Self {
            table,
            unit_seconds,
            frames_per_second,
            start_frame,
            replace_existing: false,
            weights: VisemeWeights::default(),
            range_policy: RangePolicy::default(),
        };
        // frames grow with elapsed units, so the end of each entry bounds it
        for (morph, entry) in table {
            let units = entry.total_units();
            if request.checked_frame_at(units).is_none() {
                return Err(CommandError::InvalidArgument(format!(
                    "morph {morph:?}: timeline of {units} units from frame {start_frame} \
                     overflows the frame range"
                )));
            }
        }
        Ok(request)
    }

    /// Request for a received keyframe command. `current_frame` is used when
    /// the command leaves the start frame to the host.
    pub fn for_command(
        cmd: &'a KeyFramesCommand,
        frames_per_second: f64,
        current_frame: i64,
    ) -> Result<Self, CommandError> {
        Ok(Self::new(
            &cmd.table,
            cmd.unit_seconds,
            frames_per_second,
            cmd.start_frame.unwrap_or(current_frame),
        )?
        .replace_existing(cmd.replace_existing))
    }

    /// Set whether the apply step clears the affected range first.
    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }

    /// Override the default viseme target weights.
    pub fn weights(mut self, weights: VisemeWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Select the replacement range policy.
    pub fn range_policy(mut self, policy: RangePolicy) -> Self {
        self.range_policy = policy;
        self
    }

    /// First frame of the timeline.
    pub fn start_frame(&self) -> i64 {
        self.start_frame
    }

    fn checked_frame_at(&self, elapsed_units: f64) -> Option<i64> {
        let seconds = elapsed_units * self.unit_seconds;
        let offset = (seconds * self.frames_per_second).round();
        // `i64::MAX as f64` rounds up to 2^63, hence the strict upper bound
        if !(offset.is_finite() && offset >= i64::MIN as f64 && offset < i64::MAX as f64) {
            return None;
        }
        self.start_frame.checked_add(offset as i64)
    }

    /// Frame of a step starting `elapsed_units` into a timeline. `new` has
    /// checked that every timeline end fits, so this never saturates.
    fn frame_at(&self, elapsed_units: f64) -> i64 {
        self.checked_frame_at(elapsed_units).unwrap_or(i64::MAX)
    }
}

/// Output of [`schedule`]: keyframes grouped per morph, frame ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeSchedule {
    /// Morph → `(frame, weight)` pairs, strictly ascending by frame.
    pub tracks: BTreeMap<String, Vec<(i64, f32)>>,
    /// Range cleared before insertion when `replace_existing` is set.
    pub range: Option<FrameRange>,
    /// Morphs whose existing keyframes inside `range` are cleared.
    pub affected: Vec<String>,
    /// Whether applying clears `range` for `affected` morphs first.
    pub replace_existing: bool,
}

impl KeyframeSchedule {
    /// Total number of keyframes across all morphs.
    pub fn len(&self) -> usize {
        self.tracks.values().map(Vec::len).sum()
    }

    /// Whether no keyframes were generated.
    pub fn is_empty(&self) -> bool {
        self.tracks.values().all(Vec::is_empty)
    }

    /// Flattened keyframes, morph by morph, frame ascending.
    pub fn keyframes(&self) -> impl Iterator<Item = Keyframe> + '_ {
        self.tracks.iter().flat_map(|(morph, keys)| {
            keys.iter().map(move |&(frame, weight)| Keyframe {
                morph: morph.clone(),
                frame,
                weight,
            })
        })
    }

    /// Write the schedule into a host track: clear the affected range of the
    /// affected morphs (when replacing), then insert every keyframe.
    pub fn apply<T>(&self, track: &mut T) -> Result<ApplyReport, TrackError>
    where
        T: KeyframeTrack + ?Sized,
    {
        let mut report = ApplyReport::default();
        if self.replace_existing {
            if let Some(range) = self.range {
                for morph in &self.affected {
                    report.removed += track.remove_keyframes(morph, range)?;
                }
            }
        }
        for kf in self.keyframes() {
            track.insert_keyframe(&kf)?;
            report.inserted += 1;
        }
        Ok(report)
    }
}

/// Turn a timeline into keyframes.
///
/// `lookup(morph, frame)` reports the weight the host track already holds
/// (0 where nothing was keyed). It is only consulted for the leading-`Closed`
/// elision; the scheduler never mutates host state.
pub fn schedule<F>(request: &ScheduleRequest<'_>, lookup: F) -> KeyframeSchedule
where
    F: Fn(&str, i64) -> f32,
{
    let mut tracks = BTreeMap::new();
    for (morph, entry) in request.table {
        let mut frames: BTreeMap<i64, f32> = BTreeMap::new();
        let mut elapsed = 0.0_f64;
        for (idx, key) in entry.keys.iter().enumerate() {
            let frame = request.frame_at(elapsed);
            elapsed += key.units;
            let redundant_silence = idx == 0
                && key.viseme == Viseme::Closed
                && frame == request.start_frame
                && lookup(morph, frame).abs() < f32::EPSILON;
            if redundant_silence {
                continue;
            }
            // same frame twice within one morph: later step wins
            frames.insert(frame, key.target_weight(&request.weights));
        }
        if !frames.is_empty() {
            tracks.insert(morph.clone(), frames.into_iter().collect::<Vec<_>>());
        }
    }

    let (range, affected) = match request.range_policy {
        RangePolicy::GeneratedKeyframes => (
            FrameRange::spanning(tracks.values().flatten().map(|&(frame, _)| frame)),
            tracks.keys().cloned().collect(),
        ),
        RangePolicy::TimelineSpan => {
            let spoken: Vec<_> = request
                .table
                .iter()
                .filter(|(_, entry)| !entry.is_empty())
                .collect();
            let longest = spoken
                .iter()
                .map(|(_, entry)| entry.total_units())
                .fold(None, |acc: Option<f64>, u| Some(acc.map_or(u, |a| a.max(u))));
            (
                longest.map(|units| FrameRange::new(request.start_frame, request.frame_at(units))),
                spoken.into_iter().map(|(morph, _)| morph.clone()).collect(),
            )
        }
    };

    KeyframeSchedule {
        tracks,
        range,
        affected,
        replace_existing: request.replace_existing,
    }
}

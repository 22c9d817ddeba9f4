// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Lip-sync command model and keyframe scheduling.
//!
//! Pure data plus pure functions: the viseme timeline model, the versioned
//! command payload distributed by the hub, the scheduler that turns a timeline
//! into frame-indexed keyframes, and the narrow port an animation host
//! implements so schedules can be applied to its keyframe storage.
//!
//! Nothing in this crate performs I/O or holds shared mutable state.

mod command;
mod model;
mod schedule;
mod track;

pub use command::{
    Command, CommandError, CommandKind, KeyFramesCommand, KeyFramesOptions, VersionedCommand,
};
pub use model::{
    FrameRange, Keyframe, MorphTimelineTable, MorphWeight, TimelineEntry, Viseme, VisemeKey,
    VisemeWeights,
};
pub use schedule::{schedule, KeyframeSchedule, RangePolicy, ScheduleRequest};
pub use track::{AnimationHost, ApplyReport, KeyframeTrack, MemoryTrack, TrackError};

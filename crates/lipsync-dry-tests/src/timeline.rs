// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Builders for morph timeline tables and keyframe commands.

use lipsync_core::{
    Command, CommandError, KeyFramesOptions, MorphTimelineTable, TimelineEntry, Viseme, VisemeKey,
};

/// Builder for [`MorphTimelineTable`] fixtures.
///
/// # Example
///
/// ```
/// use lipsync_core::Viseme;
/// use lipsync_dry_tests::TimelineBuilder;
///
/// let table = TimelineBuilder::new()
///     .morph("a", &[(Viseme::A, 1.0), (Viseme::Closed, 1.0)])
///     .build();
///
/// assert_eq!(table["a"].keys.len(), 2);
/// ```
#[derive(Default)]
pub struct TimelineBuilder {
    table: MorphTimelineTable,
    options: KeyFramesOptions,
}

impl TimelineBuilder {
    /// Empty table, default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a morph with default-weighted steps.
    pub fn morph(mut self, name: &str, steps: &[(Viseme, f64)]) -> Self {
        let entry = steps
            .iter()
            .map(|&(viseme, units)| VisemeKey::new(viseme, units))
            .collect();
        self.table.insert(name.to_string(), entry);
        self
    }

    /// Add (or replace) a morph with explicitly weighted steps.
    pub fn weighted_morph(mut self, name: &str, steps: &[(Viseme, f64, f32)]) -> Self {
        let entry: TimelineEntry = steps
            .iter()
            .map(|&(viseme, units, weight)| VisemeKey::weighted(viseme, units, weight))
            .collect();
        self.table.insert(name.to_string(), entry);
        self
    }

    /// Pin the start frame of the built command.
    pub fn start_frame(mut self, frame: i64) -> Self {
        self.options.start_frame = Some(frame);
        self
    }

    /// Ask hosts to clear the affected range before inserting.
    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.options.replace_existing = replace;
        self
    }

    /// Build the table.
    pub fn build(self) -> MorphTimelineTable {
        self.table
    }

    /// Build a validated [`Command::KeyFrames`].
    pub fn build_command(self, unit_seconds: f64) -> Result<Command, CommandError> {
        Command::key_frames_with(self.table, unit_seconds, self.options)
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Versioned command payloads and their construction-time validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{MorphTimelineTable, MorphWeight};

/// Error raised when a command cannot be constructed from its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// An input was null, out of range, or non-finite.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Optional knobs for a keyframe command.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyFramesOptions {
    /// Frame the timeline starts on. `None` means the host's current frame.
    pub start_frame: Option<i64>,
    /// Delete existing keyframes of the affected morphs inside the generated
    /// range before inserting.
    pub replace_existing: bool,
}

/// Timeline payload of a [`Command::KeyFrames`] command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyFramesCommand {
    /// Per-morph viseme timelines.
    pub table: MorphTimelineTable,
    /// Seconds per timeline unit. Always `> 0` once constructed.
    pub unit_seconds: f64,
    /// Frame the timeline starts on; `None` defers to the host.
    pub start_frame: Option<i64>,
    /// See [`KeyFramesOptions::replace_existing`].
    pub replace_existing: bool,
}

/// Payload distributed from the producer to every attached host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Command {
    /// Nothing to apply (initial hub state).
    #[default]
    None,
    /// Direct weight snapshot.
    MorphWeights(Vec<MorphWeight>),
    /// Viseme timeline to be scheduled by the host.
    KeyFrames(KeyFramesCommand),
}

/// Discriminant of a [`Command`], handy for logging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandKind {
    /// [`Command::None`].
    None,
    /// [`Command::MorphWeights`].
    MorphWeights,
    /// [`Command::KeyFrames`].
    KeyFrames,
}

impl Command {
    /// Weight snapshot command. Entries with blank morph names are dropped.
    pub fn morph_weights<I>(weights: I) -> Self
    where
        I: IntoIterator<Item = MorphWeight>,
    {
        Command::MorphWeights(weights.into_iter().filter(MorphWeight::is_valid).collect())
    }

    /// Timeline command with default options.
    pub fn key_frames(table: MorphTimelineTable, unit_seconds: f64) -> Result<Self, CommandError> {
        Self::key_frames_with(table, unit_seconds, KeyFramesOptions::default())
    }

    /// Timeline command. Rejects a non-positive or non-finite unit length and
    /// malformed keys.
    pub fn key_frames_with(
        table: MorphTimelineTable,
        unit_seconds: f64,
        options: KeyFramesOptions,
    ) -> Result<Self, CommandError> {
        let cmd = KeyFramesCommand {
            table,
            unit_seconds,
            start_frame: options.start_frame,
            replace_existing: options.replace_existing,
        };
        cmd.validate()?;
        Ok(Command::KeyFrames(cmd))
    }

    /// Re-check a command that was built elsewhere (e.g. decoded off the wire)
    /// and normalise it the same way the constructors do.
    pub fn normalized(self) -> Result<Self, CommandError> {
        match self {
            Command::None => Ok(Command::None),
            Command::MorphWeights(w) => Ok(Command::morph_weights(w)),
            Command::KeyFrames(k) => {
                k.validate()?;
                Ok(Command::KeyFrames(k))
            }
        }
    }

    /// Variant discriminant.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::None => CommandKind::None,
            Command::MorphWeights(_) => CommandKind::MorphWeights,
            Command::KeyFrames(_) => CommandKind::KeyFrames,
        }
    }
}

impl KeyFramesCommand {
    /// Check the invariants a constructed command must hold.
    pub fn validate(&self) -> Result<(), CommandError> {
        if !(self.unit_seconds.is_finite() && self.unit_seconds > 0.0) {
            return Err(CommandError::InvalidArgument(format!(
                "unit_seconds must be a positive finite number, got {}",
                self.unit_seconds
            )));
        }
        for (morph, entry) in &self.table {
            for (idx, key) in entry.keys.iter().enumerate() {
                if !(key.units.is_finite() && key.units >= 0.0) {
                    return Err(CommandError::InvalidArgument(format!(
                        "morph {morph:?} key {idx}: units must be finite and non-negative, got {}",
                        key.units
                    )));
                }
                if key.weight.is_some_and(|w| !w.is_finite()) {
                    return Err(CommandError::InvalidArgument(format!(
                        "morph {morph:?} key {idx}: weight must be finite"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A command tagged with the hub version it was stored under.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VersionedCommand {
    /// Store version; 0 for the initial `None` command.
    pub version: u64,
    /// The payload.
    pub command: Command,
}

impl VersionedCommand {
    /// Pair a command with its version.
    pub fn new(version: u64, command: Command) -> Self {
        Self { version, command }
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-tick command driver for animation hosts.
//!
//! The host calls [`TickDriver::tick`] once per frame or timer tick. Each call
//! applies at most one queued command, so a burst of pushes plays out over
//! several ticks in arrival order instead of being collapsed.

use lipsync_app_core::prefs::SchedulePrefs;
use lipsync_core::{
    schedule, AnimationHost, Command, CommandError, CommandKind, KeyFramesCommand, MorphWeight,
    ScheduleRequest, TrackError, VersionedCommand,
};
use thiserror::Error;
use tracing::debug;

/// Anything the driver can pull received commands from.
pub trait CommandSource {
    /// Next buffered command, or `None` without waiting.
    fn next_command(&mut self) -> Option<VersionedCommand>;

    /// Next command with the attachment it arrived on. Versions are only
    /// ordered within one attachment. Sources that never re-attach report 0.
    fn next_attached(&mut self) -> Option<(u64, VersionedCommand)> {
        self.next_command().map(|c| (0, c))
    }
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was queued.
    Idle,
    /// A command was applied to the host.
    Applied {
        /// Version of the applied command.
        version: u64,
        /// Its variant.
        kind: CommandKind,
    },
    /// A command not newer than the last applied one was dropped.
    Skipped {
        /// Version of the dropped command.
        version: u64,
    },
}

/// Failure applying a command. The command is consumed either way.
///
/// On [`TickError::Track`] the host may be partly written: weights set before
/// the failing one stay set, and a replacing timeline may have cleared its
/// range before an insert failed. The driver does not roll back; hosts that
/// need all-or-nothing must snapshot and restore around the tick.
#[derive(Debug, Error)]
pub enum TickError {
    /// The timeline could not be scheduled (e.g. no usable frame rate, or frames past `i64`).
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The host refused a write.
    #[error(transparent)]
    Track(#[from] TrackError),
}

/// Applies queued commands to an [`AnimationHost`], one per tick.
#[derive(Debug, Clone, Default)]
pub struct TickDriver {
    prefs: SchedulePrefs,
    attachment: u64,
    last_applied: Option<u64>,
}

impl TickDriver {
    /// Driver using the given scheduling preferences.
    pub fn new(prefs: SchedulePrefs) -> Self {
        Self {
            prefs,
            attachment: 0,
            last_applied: None,
        }
    }

    /// Version of the last command applied since the last [`reset`](Self::reset).
    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    /// Forget the last applied version. Happens on its own when a command
    /// from a new attachment arrives.
    pub fn reset(&mut self) {
        self.last_applied = None;
    }

    /// Dequeue and apply at most one command.
    pub fn tick<S, H>(&mut self, source: &mut S, host: &mut H) -> Result<TickOutcome, TickError>
    where
        S: CommandSource + ?Sized,
        H: AnimationHost + ?Sized,
    {
        let Some((attachment, VersionedCommand { version, command })) = source.next_attached()
        else {
            return Ok(TickOutcome::Idle);
        };
        if attachment != self.attachment {
            debug!(attachment, "new attachment; forgetting applied versions");
            self.attachment = attachment;
            self.last_applied = None;
        }
        if self.last_applied.is_some_and(|last| version <= last) {
            debug!(version, "skipping stale command");
            return Ok(TickOutcome::Skipped { version });
        }
        let kind = command.kind();
        match &command {
            Command::None => {}
            Command::MorphWeights(weights) => apply_weights(weights, host)?,
            Command::KeyFrames(kf) => self.apply_key_frames(kf, host)?,
        }
        self.last_applied = Some(version);
        debug!(version, ?kind, "applied command");
        Ok(TickOutcome::Applied { version, kind })
    }

    fn apply_key_frames<H>(&self, kf: &KeyFramesCommand, host: &mut H) -> Result<(), TickError>
    where
        H: AnimationHost + ?Sized,
    {
        let host_fps = host.frames_per_second();
        let fps = if host_fps.is_finite() && host_fps > 0.0 {
            host_fps
        } else {
            self.prefs.frames_per_second
        };
        let request = ScheduleRequest::for_command(kf, fps, host.current_frame())?
            .weights(self.prefs.viseme_weights)
            .range_policy(self.prefs.range_policy);
        let plan = schedule(&request, |morph, frame| host.existing_weight(morph, frame));
        let report = plan.apply(host)?;
        debug!(
            removed = report.removed,
            inserted = report.inserted,
            range = ?plan.range,
            "keyframes applied"
        );
        Ok(())
    }
}

fn apply_weights<H>(weights: &[MorphWeight], host: &mut H) -> Result<(), TrackError>
where
    H: AnimationHost + ?Sized,
{
    for w in weights {
        host.set_morph_weight(&w.morph, w.weight)?;
    }
    Ok(())
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Single-slot versioned command store.

use lipsync_core::{Command, VersionedCommand};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Holds the latest command and its version. No history is kept.
///
/// The slot lock is only ever held while swapping or cloning the value and
/// while running the closures passed to [`replace_with`](Self::replace_with)
/// and [`observe`](Self::observe); those must not block on I/O.
#[derive(Debug, Default)]
pub struct CommandStore {
    slot: Mutex<VersionedCommand>,
}

impl CommandStore {
    /// Store at version 0 holding [`Command::None`].
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, VersionedCommand> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the stored command; returns the new version (previous + 1).
    pub fn replace(&self, command: Command) -> u64 {
        self.replace_with(command, |_| ()).0
    }

    /// Replace the stored command and run `f` on the new value before the
    /// slot is released, so whatever `f` does is ordered with the replacement.
    pub fn replace_with<R>(
        &self,
        command: Command,
        f: impl FnOnce(&VersionedCommand) -> R,
    ) -> (u64, R) {
        let mut slot = self.slot();
        slot.version += 1;
        slot.command = command;
        let out = f(&slot);
        (slot.version, out)
    }

    /// Run `f` on the current value while no replacement can interleave.
    pub fn observe<R>(&self, f: impl FnOnce(&VersionedCommand) -> R) -> R {
        f(&self.slot())
    }

    /// Snapshot of the current command and version.
    pub fn current(&self) -> VersionedCommand {
        self.slot().clone()
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.slot().version
    }
}

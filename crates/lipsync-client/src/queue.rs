// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! FIFO of received commands shared between the transport and the tick loop.

use lipsync_core::VersionedCommand;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::tick::CommandSource;

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<VersionedCommand>,
    attachment: u64,
    disposed: bool,
}

/// Unbounded FIFO of pushed commands.
///
/// Cloning yields another handle onto the same queue, so the transport's
/// reader thread can push while the host's tick loop dequeues.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<Inner>>,
}

impl CommandQueue {
    /// Empty open queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a pushed command. Returns `false` (and drops it) once disposed.
    pub fn on_push(&self, command: VersionedCommand) -> bool {
        let mut inner = self.lock();
        if inner.disposed {
            return false;
        }
        inner.items.push_back(command);
        true
    }

    /// Take the oldest command without waiting.
    pub fn dequeue(&self) -> Option<VersionedCommand> {
        self.lock().items.pop_front()
    }

    /// Drop everything buffered; the queue stays open.
    pub fn clear(&self) {
        self.lock().items.clear();
    }

    /// Drop everything buffered and start a new attachment. Versions pushed
    /// from now on are not comparable with earlier ones.
    pub fn restart(&self) {
        let mut inner = self.lock();
        inner.items.clear();
        inner.attachment += 1;
    }

    /// Current attachment, bumped by [`restart`](Self::restart).
    pub fn attachment(&self) -> u64 {
        self.lock().attachment
    }

    /// Take the oldest command together with its attachment.
    pub fn dequeue_attached(&self) -> Option<(u64, VersionedCommand)> {
        let mut inner = self.lock();
        let attachment = inner.attachment;
        inner.items.pop_front().map(|c| (attachment, c))
    }

    /// Clear and close. Later pushes are ignored.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        inner.items.clear();
        inner.disposed = true;
    }

    /// Buffered command count.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Whether [`dispose`](Self::dispose) ran.
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

impl CommandSource for CommandQueue {
    fn next_command(&mut self) -> Option<VersionedCommand> {
        self.dequeue()
    }

    fn next_attached(&mut self) -> Option<(u64, VersionedCommand)> {
        self.dequeue_attached()
    }
}

//! Transport actions deferred until the device is ready.

use crate::sound::{SoundId, SoundKind};
use std::collections::VecDeque;

/// A transport action on one sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Play,
    Stop,
    Pause,
    Loop,
    NoLoop,
    FadeUp,
    FadeDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedAction {
    pub action: Action,
    pub target: SoundId,
}

/// One FIFO of pending actions per sound kind.
///
/// Actions are never reordered within a kind. Draining yields the mono queue
/// first, then stereo, then streaming.
#[derive(Debug, Default)]
pub struct ActionQueues {
    mono: VecDeque<QueuedAction>,
    stereo: VecDeque<QueuedAction>,
    streaming: VecDeque<QueuedAction>,
}

impl ActionQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, kind: SoundKind) -> &mut VecDeque<QueuedAction> {
        match kind {
            SoundKind::Mono => &mut self.mono,
            SoundKind::Stereo => &mut self.stereo,
            SoundKind::Streaming => &mut self.streaming,
        }
    }

    pub fn push(&mut self, kind: SoundKind, action: Action, target: SoundId) {
        log::debug!("Queued {:?} for {} until the device is ready", action, target);
        self.queue_mut(kind).push_back(QueuedAction { action, target });
    }

    pub fn len(&self) -> usize {
        self.mono.len() + self.stereo.len() + self.streaming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending actions of one kind, oldest first
    pub fn pending(&self, kind: SoundKind) -> impl Iterator<Item = &QueuedAction> {
        match kind {
            SoundKind::Mono => self.mono.iter(),
            SoundKind::Stereo => self.stereo.iter(),
            SoundKind::Streaming => self.streaming.iter(),
        }
    }

    /// Empties every queue in replay order.
    pub fn drain(&mut self) -> Vec<QueuedAction> {
        let mut drained = Vec::with_capacity(self.len());
        drained.extend(self.mono.drain(..));
        drained.extend(self.stereo.drain(..));
        drained.extend(self.streaming.drain(..));
        drained
    }

    /// Removes every action targeting `sound`.
    pub fn purge(&mut self, sound: SoundId) -> usize {
        let before = self.len();
        for queue in [&mut self.mono, &mut self.stereo, &mut self.streaming] {
            queue.retain(|queued| queued.target != sound);
        }
        before - self.len()
    }
}

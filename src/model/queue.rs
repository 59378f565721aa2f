use std::collections::VecDeque;
use super::track::TrackDescriptor;

/// Pending tracks of one guild plus the one currently playing.
///
/// The pending sequence never holds the current track: [`advance`](GuildQueue::advance) moves
/// the head out of it.
#[derive(Clone, Debug, Default)]
pub struct GuildQueue {
    pending: VecDeque<TrackDescriptor>,
    current: Option<TrackDescriptor>,
}

impl GuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `tracks` to the tail, keeping their order.
    pub fn append(&mut self, tracks: impl IntoIterator<Item = TrackDescriptor>) {
        self.pending.extend(tracks);
    }

    /// Pops the head into `current` and returns the previous `current`.
    ///
    /// With nothing pending, `current` becomes empty.
    pub fn advance(&mut self) -> Option<TrackDescriptor> {
        std::mem::replace(&mut self.current, self.pending.pop_front())
    }

    /// Number of pending tracks, not counting `current`.
    pub fn size(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn current(&self) -> Option<&TrackDescriptor> {
        self.current.as_ref()
    }

    pub fn peek(&self) -> Option<&TrackDescriptor> {
        self.pending.front()
    }

    pub fn pending(&self) -> impl Iterator<Item = &TrackDescriptor> {
        self.pending.iter()
    }

    /// Puts `current` back at the head of the pending tracks.
    pub fn rewind(&mut self) {
        if let Some(track) = self.current.take() {
            self.pending.push_front(track);
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

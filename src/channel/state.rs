use crate::{ChannelError, ChannelId, ChannelQueue, Direction};
use tracing::warn;

/// The state of one channel: its queue and who is attached to it.
///
/// The transitions here are pure. The [`ChannelRegistry`] applies them under
/// its lock, so the three fields always change together.
///
/// [`ChannelRegistry`]: crate::ChannelRegistry
#[derive(Debug, Clone)]
pub(crate) struct ChannelState {
    pub(crate) queue: ChannelQueue,
    pub(crate) has_reader: bool,
    pub(crate) writer_count: usize,
}

impl ChannelState {
    /// State of a channel created by its first participant.
    pub(crate) fn new(direction: Direction) -> Self {
        Self {
            queue: ChannelQueue::new(),
            has_reader: direction.is_read(),
            writer_count: usize::from(!direction.is_read()),
        }
    }

    /// Attach another participant. On error the state is unchanged.
    pub(crate) fn join(&mut self, id: &ChannelId, direction: Direction) -> Result<(), ChannelError> {
        match direction {
            Direction::Read if self.has_reader => {
                return Err(ChannelError::DuplicateReader(id.clone()))
            }
            Direction::Read => self.has_reader = true,
            Direction::Write => self.writer_count += 1,
        }
        Ok(())
    }

    /// Detach a participant.
    pub(crate) fn leave(&mut self, id: &ChannelId, direction: Direction) {
        match direction {
            Direction::Read => self.has_reader = false,
            Direction::Write if self.writer_count == 0 => {
                warn!(channel = %id, "writer left a channel with no writers");
            }
            Direction::Write => self.writer_count -= 1,
        }
    }

    /// True when nobody is attached and the channel should be dropped.
    pub(crate) const fn is_vacant(&self) -> bool {
        !self.has_reader && self.writer_count == 0
    }

    pub(crate) fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            has_reader: self.has_reader,
            writer_count: self.writer_count,
            queued: self.queue.len(),
        }
    }
}

/// A point-in-time view of a channel's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSnapshot {
    /// True if a reader is registered.
    pub has_reader: bool,
    /// Number of registered writers.
    pub writer_count: usize,
    /// Number of buffered, undelivered messages.
    pub queued: usize,
}

#[cfg(test)]
mod test {
    use super::*;

    fn id() -> ChannelId {
        ChannelId::new("c1")
    }

    #[test]
    fn first_participant_sets_counts() {
        let reader = ChannelState::new(Direction::Read);
        assert!(reader.has_reader);
        assert_eq!(reader.writer_count, 0);

        let writer = ChannelState::new(Direction::Write);
        assert!(!writer.has_reader);
        assert_eq!(writer.writer_count, 1);
    }

    #[test]
    fn second_reader_is_rejected_without_change() {
        let mut state = ChannelState::new(Direction::Write);
        state.join(&id(), Direction::Read).unwrap();

        let err = state.join(&id(), Direction::Read).unwrap_err();
        assert_eq!(err, ChannelError::DuplicateReader(id()));
        assert!(state.has_reader);
        assert_eq!(state.writer_count, 1);
    }

    #[test]
    fn vacant_iff_nobody_attached() {
        let mut state = ChannelState::new(Direction::Read);
        state.join(&id(), Direction::Write).unwrap();

        state.leave(&id(), Direction::Read);
        assert!(!state.is_vacant());
        state.leave(&id(), Direction::Write);
        assert!(state.is_vacant());
    }

    #[test]
    fn writer_count_is_clamped() {
        let mut state = ChannelState::new(Direction::Read);
        state.leave(&id(), Direction::Write);
        assert_eq!(state.writer_count, 0);
        assert!(state.has_reader);
    }
}

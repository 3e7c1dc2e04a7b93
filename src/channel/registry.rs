use crate::{
    channel::state::{ChannelSnapshot, ChannelState},
    AdmitError, ChannelError, ChannelId, ChannelQueue, ChannelRequest, Direction,
};
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, warn};

/// The process-wide store of channel state.
///
/// Maps each [`ChannelId`] to its queue, reader flag and writer count. Every
/// operation runs as one short critical section under a single lock, so
/// concurrent sessions never observe a half-updated channel.
///
/// The registry is cheap to clone. Clones share the same map, so a single
/// registry can be handed to several listeners, or a fresh one created per
/// test.
///
/// A channel exists in the registry if and only if it has a reader or at
/// least one writer. When the last participant leaves, the channel and any
/// messages still buffered in its queue are dropped.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<Mutex<HashMap<ChannelId, ChannelState>>>,
}

impl ChannelRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelId, ChannelState>> {
        // Transitions are computed before the map is touched, so a panic in
        // another holder cannot leave a torn entry behind.
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a participant on a channel, creating the channel if needed.
    /// Returns a handle to the channel's queue.
    ///
    /// Fails with [`ChannelError::DuplicateReader`] if `direction` is
    /// [`Direction::Read`] and the channel already has a reader. In that
    /// case the channel is left untouched.
    pub fn register(
        &self,
        id: &ChannelId,
        direction: Direction,
    ) -> Result<ChannelQueue, ChannelError> {
        let mut channels = self.lock();
        let state = match channels.entry(id.clone()) {
            Entry::Vacant(entry) => {
                debug!(channel = %id, %direction, "creating channel");
                entry.insert(ChannelState::new(direction))
            }
            Entry::Occupied(entry) => {
                let state = entry.into_mut();
                state.join(id, direction)?;
                state
            }
        };
        debug!(
            channel = %id,
            %direction,
            has_reader = state.has_reader,
            writer_count = state.writer_count,
            "registered"
        );
        Ok(state.queue.clone())
    }

    /// Deregister a participant from a channel. The channel is removed once
    /// it has neither a reader nor writers.
    ///
    /// Deregistering from a channel that does not exist is a no-op.
    pub fn deregister(&self, id: &ChannelId, direction: Direction) {
        let mut channels = self.lock();
        let Some(state) = channels.get_mut(id) else {
            debug!(channel = %id, %direction, "deregistered from unknown channel");
            return;
        };

        state.leave(id, direction);
        debug!(
            channel = %id,
            %direction,
            has_reader = state.has_reader,
            writer_count = state.writer_count,
            "deregistered"
        );

        if state.is_vacant() {
            let dropped = state.queue.len();
            channels.remove(id);
            if dropped > 0 {
                warn!(channel = %id, dropped, "removing channel with undelivered messages");
            } else {
                debug!(channel = %id, "removing channel");
            }
        }
    }

    /// Register a participant and wrap the result in a [`Registration`]
    /// that deregisters it exactly once.
    pub fn join(&self, request: ChannelRequest) -> Result<Registration, ChannelError> {
        let queue = self.register(&request.channel, request.direction)?;
        Ok(Registration {
            registry: self.clone(),
            request,
            queue,
            released: false,
        })
    }

    /// Parse the query string of an upgrade request and join the channel it
    /// names. This is the whole of connection admission; on error no channel
    /// state has changed.
    pub fn admit(&self, query: Option<&str>) -> Result<Registration, AdmitError> {
        let request = ChannelRequest::from_query(query)?;
        Ok(self.join(request)?)
    }

    /// Get a point-in-time view of a channel, if it exists.
    pub fn snapshot(&self, id: &ChannelId) -> Option<ChannelSnapshot> {
        self.lock().get(id).map(ChannelState::snapshot)
    }

    /// True if the channel exists.
    pub fn contains(&self, id: &ChannelId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of live channels.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if there are no live channels.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// A participant's claim on a channel.
///
/// Created by [`ChannelRegistry::join`]. Releasing deregisters the
/// participant; only the first release has any effect, so a session may
/// release from its close-handshake path and again from its exit path.
/// Dropping an unreleased registration releases it.
#[derive(Debug)]
pub struct Registration {
    registry: ChannelRegistry,
    request: ChannelRequest,
    queue: ChannelQueue,
    released: bool,
}

impl Registration {
    /// The channel this registration is attached to.
    pub const fn channel(&self) -> &ChannelId {
        &self.request.channel
    }

    /// The role of this registration.
    pub const fn direction(&self) -> Direction {
        self.request.direction
    }

    /// The `(channel, direction)` pair.
    pub const fn request(&self) -> &ChannelRequest {
        &self.request
    }

    /// The channel's shared queue.
    pub const fn queue(&self) -> &ChannelQueue {
        &self.queue
    }

    /// True once [`Self::release`] has run.
    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Deregister from the channel. Subsequent calls do nothing.
    pub fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        self.registry
            .deregister(&self.request.channel, self.request.direction);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

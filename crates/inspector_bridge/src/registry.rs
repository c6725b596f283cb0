//! Live channels keyed by the transport connection that owns them.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use crate::{channel::Channel, engine::EngineSession};

/// Opaque identity of one debugger connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps connection identities to their channels.
///
/// Lookups hand out `Rc` clones so a channel can keep dispatching while the
/// registry itself is mutated (a message handler may close its own
/// connection, or the whole inspector). Removal releases the engine session
/// right away, even while such a clone is outstanding.
pub struct SessionRegistry<S: EngineSession> {
    channels: HashMap<ConnectionId, Rc<Channel<S>>>,
}

impl<S: EngineSession> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Adds a channel under `id`. An existing channel with the same id is
    /// replaced and released.
    pub fn insert(&mut self, id: ConnectionId, channel: Channel<S>) {
        debug_assert_eq!(id, channel.id());
        if let Some(previous) = self.channels.insert(id, Rc::new(channel)) {
            previous.release();
        }
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<Rc<Channel<S>>> {
        self.channels.get(&id).cloned()
    }

    /// Removes and destroys the channel for `id`. Unknown ids are a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        match self.take(id) {
            Some(channel) => {
                channel.release();
                true
            }
            None => false,
        }
    }

    /// Detaches the channel for `id` without releasing it, so callers can
    /// release it once no registry borrow is held.
    pub(crate) fn take(&mut self, id: ConnectionId) -> Option<Rc<Channel<S>>> {
        self.channels.remove(&id)
    }

    pub(crate) fn drain(&mut self) -> Vec<Rc<Channel<S>>> {
        self.channels.drain().map(|(_, channel)| channel).collect()
    }

    pub fn clear(&mut self) {
        for channel in self.drain() {
            channel.release();
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.channels.keys().copied().collect()
    }
}

impl<S: EngineSession> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

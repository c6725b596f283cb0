//! Engine-side endpoint of one debugger conversation.
//!
//! A channel owns the engine session created for a connection. Inbound
//! protocol text goes straight into the session; outbound text produced by
//! the engine is converted to UTF-8 and handed to the channel's sink.
//!
//! The session is released explicitly with [`Channel::release`] (or on
//! drop), not when the last `Rc` to the channel goes away: a dispatch that
//! paused the target keeps its channel on the stack until the pause ends.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, error, trace};

use crate::{
    codec::{self, EngineString},
    engine::{ContextGroupId, EngineSession, InspectorEngine},
    error::{CodecError, EngineError},
    registry::ConnectionId,
};

/// Destination for outbound protocol text.
pub type Sink = Rc<dyn Fn(String)>;

/// First codec failure seen by any channel, surfaced by the next tick.
pub(crate) type FaultSlot = Rc<RefCell<Option<CodecError>>>;

enum Outbound {
    /// No sink yet; messages wait here in production order.
    Pending(VecDeque<String>),
    Attached(Sink),
}

pub struct Channel<S: EngineSession> {
    id: ConnectionId,
    outbound: Rc<RefCell<Outbound>>,
    session: RefCell<Option<Rc<S>>>,
}

impl<S: EngineSession> Channel<S> {
    /// Registers a new conversation with the engine.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if it refuses the session.
    pub fn open<E>(
        engine: &E,
        context_group_id: ContextGroupId,
        id: ConnectionId,
    ) -> Result<Self, EngineError>
    where
        E: InspectorEngine<Session = S>,
    {
        Self::open_with_faults(engine, context_group_id, id, FaultSlot::default())
    }

    pub(crate) fn open_with_faults<E>(
        engine: &E,
        context_group_id: ContextGroupId,
        id: ConnectionId,
        faults: FaultSlot,
    ) -> Result<Self, EngineError>
    where
        E: InspectorEngine<Session = S>,
    {
        let outbound = Rc::new(RefCell::new(Outbound::Pending(VecDeque::new())));

        let handler_outbound = Rc::clone(&outbound);
        let session = engine.connect(
            context_group_id,
            Box::new(move |message: EngineString<'_>| {
                deliver(&handler_outbound, &faults, id, message);
            }),
        )?;

        debug!(connection_id = %id, context_group_id = %context_group_id, "Opened engine session");

        Ok(Self {
            id,
            outbound,
            session: RefCell::new(Some(Rc::new(session))),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Forwards an inbound protocol message into the engine. A no-op once
    /// the session has been released.
    pub fn dispatch(&self, message: &[u8]) {
        let session = self.session.borrow().clone();
        match session {
            Some(session) => session.dispatch_protocol_message(message),
            None => trace!(connection_id = %self.id, "Dropping message for released session"),
        }
    }

    /// Disconnects the engine session. Returns `false` if it was already
    /// released.
    pub fn release(&self) -> bool {
        let session = self.session.borrow_mut().take();
        match session {
            Some(session) => {
                debug!(connection_id = %self.id, "Releasing engine session");
                session.disconnect();
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.session.borrow().is_none()
    }

    /// Registers or replaces the outbound sink. Messages produced while no
    /// sink was attached are flushed to the new sink first, in order.
    pub fn set_sink(&self, sink: impl Fn(String) + 'static) {
        let sink: Sink = Rc::new(sink);
        let previous = self
            .outbound
            .replace(Outbound::Attached(Rc::clone(&sink)));

        if let Outbound::Pending(queued) = previous {
            if !queued.is_empty() {
                debug!(connection_id = %self.id, count = queued.len(), "Flushing queued outbound messages");
            }
            for message in queued {
                sink(message);
            }
        }
    }

    pub fn has_sink(&self) -> bool {
        matches!(&*self.outbound.borrow(), Outbound::Attached(_))
    }
}

impl<S: EngineSession> Drop for Channel<S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: EngineSession> std::fmt::Debug for Channel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("has_sink", &self.has_sink())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

fn deliver(
    outbound: &RefCell<Outbound>,
    faults: &FaultSlot,
    id: ConnectionId,
    message: EngineString<'_>,
) {
    let text = match codec::encode(message) {
        Ok(text) => text,
        Err(err) => {
            error!(connection_id = %id, "Dropping outbound message: {err}");
            let mut slot = faults.borrow_mut();
            if slot.is_none() {
                *slot = Some(err);
            }
            return;
        }
    };

    // The sink runs outside the borrow so it may touch the channel again.
    let sink = match &mut *outbound.borrow_mut() {
        Outbound::Attached(sink) => Rc::clone(sink),
        Outbound::Pending(queued) => {
            queued.push_back(text);
            return;
        }
    };
    sink(text);
}

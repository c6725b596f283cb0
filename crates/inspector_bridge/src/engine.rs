//! Boundary between the bridge and the embedded script engine.
//!
//! The engine implements [`InspectorEngine`] and [`EngineSession`]; the bridge
//! implements [`InspectorClient`] and hands it to the engine on attach so the
//! engine can request pauses.
//!
//! All methods take `&self`. The engine may call back into the bridge (for
//! example [`InspectorClient::run_message_loop_on_pause`] from inside
//! [`EngineSession::dispatch_protocol_message`]) and the bridge will dispatch
//! further messages into the engine before that call returns, so engines must
//! not hold interior borrows across calls into the client or an outbound
//! handler.

use std::fmt;
use std::rc::Rc;

use crate::codec::EngineString;
use crate::error::EngineError;

/// Identifies an execution context group to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextGroupId(pub i32);

impl Default for ContextGroupId {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for ContextGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context description handed to the engine when the bridge attaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub group_id: ContextGroupId,
    pub name: String,
}

/// Receives protocol responses and notifications produced by a session.
pub type OutboundHandler = Box<dyn Fn(EngineString<'_>)>;

/// Hooks the engine invokes on the bridge.
pub trait InspectorClient {
    /// Blocks until [`quit_message_loop_on_pause`](Self::quit_message_loop_on_pause)
    /// is called, servicing the debugger transport meanwhile.
    fn run_message_loop_on_pause(&self, context_group_id: ContextGroupId);

    fn quit_message_loop_on_pause(&self);

    /// A debugger asked the target to start running.
    fn run_if_waiting_for_debugger(&self, context_group_id: ContextGroupId);
}

/// One engine-side debugging conversation.
pub trait EngineSession {
    /// Forwards raw UTF-8 protocol text into the engine. Protocol errors are
    /// reported back through the session's outbound handler.
    fn dispatch_protocol_message(&self, message: &[u8]);

    /// Releases the engine resources held by this session. Called at most
    /// once, possibly while a dispatch on the same session is still on the
    /// stack (a debugger may hang up while the target is paused).
    fn disconnect(&self);
}

/// The embedded script engine, seen from the bridge.
pub trait InspectorEngine {
    type Session: EngineSession;

    /// Establishes the debugging relationship for a context.
    fn attach(&self, context: &ContextInfo, client: Rc<dyn InspectorClient>);

    /// Opens a new conversation with the given context group.
    ///
    /// # Errors
    ///
    /// Fails when the context group is not attached or the engine refuses
    /// the session.
    fn connect(
        &self,
        context_group_id: ContextGroupId,
        outbound: OutboundHandler,
    ) -> Result<Self::Session, EngineError>;

    /// Tears down the debugging relationship; called after every session has
    /// been disconnected.
    fn detach(&self, context_group_id: ContextGroupId);

    /// Runs background callbacks queued on the engine's task queue.
    fn run_pending_tasks(&self);
}

//! A small in-process engine that speaks just enough of the debugger protocol
//! to drive the bridge: it acknowledges every request, implements pause and
//! resume through the client hooks, and echoes `Runtime.evaluate`.
//!
//! Used by the `inspector-bridge` binary and as the engine in tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::{
    codec::EngineString,
    engine::{
        ContextGroupId, ContextInfo, EngineSession, InspectorClient, InspectorEngine,
        OutboundHandler,
    },
    error::EngineError,
};

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct Shared {
    context: RefCell<Option<ContextInfo>>,
    client: RefCell<Option<Rc<dyn InspectorClient>>>,
    sessions: RefCell<BTreeMap<u64, Rc<OutboundHandler>>>,
    next_session: Cell<u64>,
    received: RefCell<Vec<String>>,
    tasks: RefCell<VecDeque<Task>>,
    disconnects: Cell<usize>,
    maintenance_passes: Cell<usize>,
}

impl Shared {
    fn client(&self) -> Option<Rc<dyn InspectorClient>> {
        self.client.borrow().clone()
    }

    fn group(&self) -> Option<ContextGroupId> {
        self.context.borrow().as_ref().map(|c| c.group_id)
    }

    fn handler(&self, session: u64) -> Option<Rc<OutboundHandler>> {
        self.sessions.borrow().get(&session).cloned()
    }

    fn handlers(&self) -> Vec<Rc<OutboundHandler>> {
        self.sessions.borrow().values().cloned().collect()
    }
}

/// Emits `text` the way a real engine would: one-byte for ASCII, two-byte
/// otherwise.
fn emit(handler: &OutboundHandler, text: &str) {
    if text.is_ascii() {
        handler(EngineString::OneByte(text.as_bytes()));
    } else {
        let units: Vec<u16> = text.encode_utf16().collect();
        handler(EngineString::TwoByte(&units));
    }
}

pub struct LoopbackEngine {
    shared: Rc<Shared>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared::default()),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.shared.context.borrow().is_some()
    }

    /// Every protocol message dispatched so far, across all sessions.
    pub fn received(&self) -> Vec<String> {
        self.shared.received.borrow().clone()
    }

    /// Sends a notification to every open session.
    pub fn notify(&self, text: &str) {
        for handler in self.shared.handlers() {
            emit(&handler, text);
        }
    }

    /// Sends an engine string to every open session without re-encoding it.
    pub fn notify_raw(&self, message: EngineString<'_>) {
        for handler in self.shared.handlers() {
            handler(message);
        }
    }

    /// Simulates hitting a breakpoint: tells every session and blocks in the
    /// client's pause loop until resumed.
    pub fn request_pause(&self, context_group_id: ContextGroupId) {
        self.notify(r#"{"method":"Debugger.paused","params":{"reason":"other","callFrames":[]}}"#);
        if let Some(client) = self.shared.client() {
            client.run_message_loop_on_pause(context_group_id);
        }
    }

    /// Queues a callback for the next [`InspectorEngine::run_pending_tasks`].
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.shared.tasks.borrow_mut().push_back(Box::new(task));
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.borrow().len()
    }

    pub fn disconnect_count(&self) -> usize {
        self.shared.disconnects.get()
    }

    pub fn maintenance_passes(&self) -> usize {
        self.shared.maintenance_passes.get()
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InspectorEngine for LoopbackEngine {
    type Session = LoopbackSession;

    fn attach(&self, context: &ContextInfo, client: Rc<dyn InspectorClient>) {
        debug!(context_group_id = %context.group_id, name = %context.name, "Loopback engine attached");
        *self.shared.context.borrow_mut() = Some(context.clone());
        *self.shared.client.borrow_mut() = Some(client);
    }

    fn connect(
        &self,
        context_group_id: ContextGroupId,
        outbound: OutboundHandler,
    ) -> Result<LoopbackSession, EngineError> {
        if self.shared.group() != Some(context_group_id) {
            return Err(EngineError::ContextNotAttached(context_group_id));
        }

        let id = self.shared.next_session.get();
        self.shared.next_session.set(id + 1);
        self.shared.sessions.borrow_mut().insert(id, Rc::new(outbound));

        Ok(LoopbackSession {
            id,
            group: context_group_id,
            shared: Rc::clone(&self.shared),
        })
    }

    fn detach(&self, context_group_id: ContextGroupId) {
        if self.shared.group() == Some(context_group_id) {
            debug!(context_group_id = %context_group_id, "Loopback engine detached");
            self.shared.context.borrow_mut().take();
            self.shared.client.borrow_mut().take();
        }
    }

    fn run_pending_tasks(&self) {
        self.shared
            .maintenance_passes
            .set(self.shared.maintenance_passes.get() + 1);

        // Only what was queued before this pass; tasks may schedule more.
        let pending = self.shared.tasks.borrow().len();
        for _ in 0..pending {
            let task = self.shared.tasks.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

pub struct LoopbackSession {
    id: u64,
    group: ContextGroupId,
    shared: Rc<Shared>,
}

impl LoopbackSession {
    fn reply(&self, message: &Value) {
        if let Some(handler) = self.shared.handler(self.id) {
            emit(&handler, &message.to_string());
        }
    }
}

impl EngineSession for LoopbackSession {
    fn dispatch_protocol_message(&self, message: &[u8]) {
        let text = String::from_utf8_lossy(message).into_owned();
        trace!(session = self.id, "Loopback dispatch: {text}");
        self.shared.received.borrow_mut().push(text.clone());

        let request: Value = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                self.reply(&json!({
                    "error": {"code": -32700, "message": format!("Parse error: {e}")}
                }));
                return;
            }
        };
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match method {
            "Debugger.pause" => {
                self.reply(&json!({"id": id, "result": {}}));
                self.reply(&json!({
                    "method": "Debugger.paused",
                    "params": {"reason": "other", "callFrames": []}
                }));
                if let Some(client) = self.shared.client() {
                    client.run_message_loop_on_pause(self.group);
                }
            }
            "Debugger.resume" => {
                self.reply(&json!({"id": id, "result": {}}));
                if let Some(client) = self.shared.client() {
                    client.quit_message_loop_on_pause();
                }
                self.reply(&json!({"method": "Debugger.resumed", "params": {}}));
            }
            "Runtime.runIfWaitingForDebugger" => {
                self.reply(&json!({"id": id, "result": {}}));
                if let Some(client) = self.shared.client() {
                    client.run_if_waiting_for_debugger(self.group);
                }
            }
            "Runtime.evaluate" => {
                let expression = request
                    .pointer("/params/expression")
                    .cloned()
                    .unwrap_or(Value::Null);
                self.reply(&json!({
                    "id": id,
                    "result": {"result": {"type": "string", "value": expression}}
                }));
            }
            _ => self.reply(&json!({"id": id, "result": {}})),
        }
    }

    fn disconnect(&self) {
        let remaining = {
            let mut sessions = self.shared.sessions.borrow_mut();
            sessions.remove(&self.id);
            sessions.len()
        };
        self.shared
            .disconnects
            .set(self.shared.disconnects.get() + 1);

        // Nobody left to resume a paused target
        if remaining == 0
            && let Some(client) = self.shared.client()
        {
            client.quit_message_loop_on_pause();
        }
    }
}

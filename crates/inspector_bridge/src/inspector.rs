//! The run-loop controller.
//!
//! [`Inspector`] owns the engine relationship, the transport and the session
//! registry. It never blocks except inside the engine's pause hook: the
//! embedder calls [`Inspector::tick`] from its own loop, and every engine
//! interaction happens inside that call on the embedder's thread.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use inspector_config::Config;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::{
    channel::{Channel, FaultSlot},
    discovery::{DiscoveryDocuments, TargetInfo},
    engine::{ContextGroupId, ContextInfo, InspectorClient, InspectorEngine},
    error::InspectorError,
    registry::{ConnectionId, SessionRegistry},
    transport::{LocalConnection, TransportEvent, TransportListener},
};

#[derive(Debug, Clone)]
pub struct InspectorOptions {
    /// Negative disables the network listener; 0 binds an ephemeral port.
    pub port: i32,
    pub host: String,
    pub context_group_id: ContextGroupId,
    pub context_name: String,
    pub target: TargetInfo,
}

impl InspectorOptions {
    #[must_use]
    pub fn with_port(mut self, port: i32) -> Self {
        self.port = port;
        self
    }
}

impl Default for InspectorOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for InspectorOptions {
    fn from(config: &Config) -> Self {
        Self {
            port: config.port,
            host: config.host.clone(),
            context_group_id: ContextGroupId(config.context_group_id),
            context_name: config.context_name.clone(),
            target: TargetInfo::from(&config.target),
        }
    }
}

struct Core<E: InspectorEngine> {
    engine: E,
    group: ContextGroupId,
    registry: RefCell<SessionRegistry<E::Session>>,
    events: RefCell<mpsc::UnboundedReceiver<TransportEvent>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    transport: RefCell<Option<TransportListener>>,
    discovery: Option<Arc<DiscoveryDocuments>>,
    port: Option<u16>,
    alive: Cell<bool>,
    paused: Cell<bool>,
    connected: Cell<bool>,
    closed: Cell<bool>,
    faults: FaultSlot,
}

impl<E: InspectorEngine> Core<E> {
    fn tick(&self) -> Result<bool, InspectorError> {
        if self.closed.get() {
            return Ok(false);
        }

        self.service();

        let fault = self.faults.borrow_mut().take();
        if let Some(fault) = fault {
            return Err(fault.into());
        }

        Ok(self.alive.get())
    }

    /// One bounded pass: the events queued right now, then the engine's
    /// background tasks.
    fn service(&self) {
        let pending = self.events.borrow().len();

        for _ in 0..pending {
            if self.closed.get() {
                return;
            }
            let event = self.events.borrow_mut().try_recv();
            match event {
                Ok(event) => {
                    trace!(connection_id = %event.connection_id(), "Servicing transport event");
                    self.handle_event(event);
                }
                Err(_) => break,
            }
        }

        if !self.closed.get() {
            self.engine.run_pending_tasks();
        }
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open { id, sink } => {
                if let Err(e) = self.open_channel(id, sink) {
                    error!(connection_id = %id, "Failed to open engine session: {e}");
                }
            }
            TransportEvent::Message { id, payload } => {
                let channel = self.registry.borrow().lookup(id);
                match channel {
                    Some(channel) => channel.dispatch(&payload),
                    None => trace!(connection_id = %id, "Dropping message for unknown connection"),
                }
            }
            TransportEvent::Failure { id, reason } => {
                warn!(connection_id = %id, "Debugger connection failed: {reason}");
                self.release_channel(id);
            }
            TransportEvent::Close { id } => {
                if self.release_channel(id) {
                    info!(connection_id = %id, "Debugger session ended");
                }
            }
        }
    }

    fn open_channel(
        &self,
        id: ConnectionId,
        sink: mpsc::UnboundedSender<String>,
    ) -> Result<(), InspectorError> {
        let channel =
            Channel::open_with_faults(&self.engine, self.group, id, Rc::clone(&self.faults))?;

        channel.set_sink(move |text| {
            if sink.send(text).is_err() {
                trace!(connection_id = %id, "Connection gone, dropping outbound message");
            }
        });
        self.registry.borrow_mut().insert(id, channel);
        debug!(connection_id = %id, "Debugger session started");
        Ok(())
    }

    fn release_channel(&self, id: ConnectionId) -> bool {
        // Released after the registry borrow ends; release calls into the engine.
        // A dispatch further up the stack may still hold this channel.
        let channel = self.registry.borrow_mut().take(id);
        channel.is_some_and(|channel| {
            channel.release();
            true
        })
    }

    fn run_message_loop_on_pause(&self, context_group_id: ContextGroupId) {
        if context_group_id != self.group {
            debug!(context_group_id = %context_group_id, "Ignoring pause for foreign context group");
            return;
        }
        if self.paused.get() || self.closed.get() {
            return;
        }

        self.paused.set(true);
        debug!("Execution paused, servicing debugger");

        while self.paused.get() && !self.closed.get() {
            self.service();
        }

        debug!("Execution resumed");
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.paused.set(false);

        let transport = self.transport.borrow_mut().take();
        if let Some(mut transport) = transport {
            transport.stop_accepting();
            self.shutdown_sessions();
            transport.join();
        } else {
            self.shutdown_sessions();
        }

        self.alive.set(false);
        self.connected.set(false);
        info!("Inspector closed");
    }

    fn shutdown_sessions(&self) {
        {
            let mut events = self.events.borrow_mut();
            events.close();
            while events.try_recv().is_ok() {}
        }

        let channels = self.registry.borrow_mut().drain();
        for channel in channels {
            channel.release();
        }

        self.engine.detach(self.group);
    }
}

/// Hook object the engine receives on attach. Holds the bridge weakly, so
/// it outlives a closed inspector harmlessly.
pub struct InspectorHandle<E: InspectorEngine> {
    core: Weak<Core<E>>,
}

impl<E: InspectorEngine> InspectorHandle<E> {
    /// A handle bound to no inspector; every hook is a no-op.
    pub fn detached() -> Self {
        Self { core: Weak::new() }
    }

    /// Closes the inspector if it still exists. Safe from inside the pause
    /// loop or an engine callback.
    pub fn close(&self) {
        if let Some(core) = self.core.upgrade() {
            core.close();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.core.upgrade().is_some_and(|core| core.paused.get())
    }

    pub fn is_alive(&self) -> bool {
        self.core.upgrade().is_some_and(|core| core.alive.get())
    }
}

impl<E: InspectorEngine> Clone for InspectorHandle<E> {
    fn clone(&self) -> Self {
        Self {
            core: Weak::clone(&self.core),
        }
    }
}

impl<E: InspectorEngine> InspectorClient for InspectorHandle<E> {
    fn run_message_loop_on_pause(&self, context_group_id: ContextGroupId) {
        if let Some(core) = self.core.upgrade() {
            core.run_message_loop_on_pause(context_group_id);
        }
    }

    fn quit_message_loop_on_pause(&self) {
        if let Some(core) = self.core.upgrade() {
            core.paused.set(false);
        }
    }

    fn run_if_waiting_for_debugger(&self, context_group_id: ContextGroupId) {
        if let Some(core) = self.core.upgrade()
            && context_group_id == core.group
        {
            debug!("Debugger asked the target to run");
            core.connected.set(true);
        }
    }
}

/// Remote-debugging bridge for one engine context.
///
/// Not `Send`: it must be created, ticked and closed on the thread that owns
/// the engine.
pub struct Inspector<E: InspectorEngine + 'static> {
    core: Rc<Core<E>>,
}

impl<E: InspectorEngine + 'static> Inspector<E> {
    /// Attaches to `engine` and starts listening on `options.port`.
    ///
    /// Transport failures do not fail construction: they are logged and the
    /// inspector reports `is_alive() == false`, while local connections and
    /// the engine relationship keep working.
    pub fn new(options: InspectorOptions, engine: E) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let transport = if options.port < 0 {
            info!(port = options.port, "Inspector network transport disabled");
            None
        } else {
            match start_transport(&options, event_tx.clone()) {
                Ok(transport) => Some(transport),
                Err(e) => {
                    warn!("{e}");
                    None
                }
            }
        };

        let discovery = transport.as_ref().map(|t| Arc::clone(t.discovery()));
        let port = transport.as_ref().map(TransportListener::port);

        let core = Rc::new(Core {
            engine,
            group: options.context_group_id,
            registry: RefCell::new(SessionRegistry::new()),
            events: RefCell::new(event_rx),
            event_tx,
            alive: Cell::new(transport.is_some()),
            transport: RefCell::new(transport),
            discovery,
            port,
            paused: Cell::new(false),
            connected: Cell::new(false),
            closed: Cell::new(false),
            faults: FaultSlot::default(),
        });

        let client: Rc<dyn InspectorClient> = Rc::new(InspectorHandle {
            core: Rc::downgrade(&core),
        });
        core.engine.attach(
            &ContextInfo {
                group_id: options.context_group_id,
                name: options.context_name,
            },
            client,
        );

        Self { core }
    }

    /// Shorthand for [`Inspector::new`] with default options on `port`.
    pub fn create(port: i32, engine: E) -> Self {
        Self::new(InspectorOptions::default().with_port(port), engine)
    }

    /// Services queued connection activity and one pass of engine tasks.
    ///
    /// Returns whether the network listener is alive. After [`close`](Self::close)
    /// this is a no-op returning `Ok(false)`.
    ///
    /// An inspector whose listener never started is not alive, yet `tick`
    /// still services it: local connections and engine tasks keep running,
    /// and only `close` turns it into a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::Codec`] when the engine produced outbound
    /// text that could not be converted since the previous tick.
    pub fn tick(&self) -> Result<bool, InspectorError> {
        self.core.tick()
    }

    /// Ticks until a debugger asks the target to run.
    ///
    /// Returns `Ok(false)` if the inspector is closed, or if nothing could
    /// ever connect (no listener, no open connections, nothing queued).
    ///
    /// # Errors
    ///
    /// Propagates tick errors.
    pub fn wait_for_debugger(&self) -> Result<bool, InspectorError> {
        info!("Waiting for debugger");
        loop {
            if self.is_connected() {
                return Ok(true);
            }
            if self.is_closed() {
                return Ok(false);
            }
            if !self.is_alive()
                && self.connection_count() == 0
                && self.core.events.borrow().is_empty()
            {
                return Ok(false);
            }

            self.tick()?;
            std::thread::yield_now();
        }
    }

    /// Opens an in-process debugger connection. Messages sent through the
    /// returned handle are serviced by `tick` like network traffic; replies
    /// arrive on the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::Closed`] after [`close`](Self::close).
    pub fn connect_local(
        &self,
    ) -> Result<(LocalConnection, mpsc::UnboundedReceiver<String>), InspectorError> {
        if self.is_closed() {
            return Err(InspectorError::Closed);
        }

        let (sink, outbound) = mpsc::unbounded_channel();
        let connection =
            LocalConnection::open(self.core.event_tx.clone(), sink).ok_or(InspectorError::Closed)?;
        Ok((connection, outbound))
    }

    /// Stops the listener, ends every session and detaches from the engine.
    /// Idempotent.
    pub fn close(&self) {
        self.core.close();
    }

    pub fn is_alive(&self) -> bool {
        self.core.alive.get()
    }

    pub fn is_paused(&self) -> bool {
        self.core.paused.get()
    }

    /// Whether a debugger has asked the target to run.
    pub fn is_connected(&self) -> bool {
        self.core.connected.get()
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.get()
    }

    /// The bound port, if the listener started.
    pub fn port(&self) -> Option<u16> {
        self.core.port
    }

    pub fn context_group_id(&self) -> ContextGroupId {
        self.core.group
    }

    pub fn connection_count(&self) -> usize {
        self.core.registry.borrow().len()
    }

    pub fn discovery(&self) -> Option<&DiscoveryDocuments> {
        self.core.discovery.as_deref()
    }

    pub fn websocket_url(&self) -> Option<&str> {
        self.discovery().map(DiscoveryDocuments::websocket_url)
    }

    pub fn engine(&self) -> &E {
        &self.core.engine
    }

    /// A weak handle for engine callbacks that need to reach the inspector.
    pub fn handle(&self) -> InspectorHandle<E> {
        InspectorHandle {
            core: Rc::downgrade(&self.core),
        }
    }
}

impl<E: InspectorEngine + 'static> Drop for Inspector<E> {
    fn drop(&mut self) {
        self.core.close();
    }
}

fn start_transport(
    options: &InspectorOptions,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> Result<TransportListener, InspectorError> {
    let port = u16::try_from(options.port).map_err(|_| InspectorError::InvalidPort(options.port))?;

    TransportListener::start(&options.host, port, &options.target, events).map_err(|source| {
        InspectorError::TransportInit {
            host: options.host.clone(),
            port: options.port,
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EngineString;
    use crate::error::EngineError;
    use crate::loopback::LoopbackEngine;
    use serde_json::Value;

    fn local_inspector() -> Inspector<LoopbackEngine> {
        Inspector::create(-1, LoopbackEngine::new())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(text) = rx.try_recv() {
            messages.push(serde_json::from_str(&text).unwrap());
        }
        messages
    }

    #[test]
    fn test_negative_port_disables_transport() {
        let inspector = local_inspector();

        assert!(!inspector.is_alive());
        assert_eq!(inspector.port(), None);
        assert!(inspector.discovery().is_none());
        assert!(inspector.engine().is_attached());
        assert!(!inspector.tick().unwrap());
    }

    #[test]
    fn test_port_out_of_range_is_not_alive() {
        let inspector = Inspector::create(70_000, LoopbackEngine::new());
        assert!(!inspector.is_alive());
        assert!(inspector.engine().is_attached());
    }

    #[test]
    fn test_ephemeral_port() {
        let inspector = Inspector::create(0, LoopbackEngine::new());

        assert!(inspector.is_alive());
        let port = inspector.port().unwrap();
        assert_ne!(port, 0);
        assert_eq!(
            inspector.websocket_url(),
            Some(format!("ws://127.0.0.1:{port}").as_str())
        );

        inspector.close();
        assert!(!inspector.is_alive());
    }

    #[test]
    fn test_messages_dispatched_in_order() {
        let inspector = local_inspector();
        let (connection, mut rx) = inspector.connect_local().unwrap();

        let sent: Vec<String> = (1..=5)
            .map(|i| format!(r#"{{"id":{i},"method":"Runtime.enable"}}"#))
            .collect();
        for message in &sent {
            assert!(connection.send(message.clone()));
        }
        inspector.tick().unwrap();

        assert_eq!(inspector.engine().received(), sent);
        let ids: Vec<i64> = drain(&mut rx)
            .iter()
            .map(|m| m["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_registry_tracks_connections() {
        let inspector = local_inspector();
        let (first, _rx1) = inspector.connect_local().unwrap();
        let (second, _rx2) = inspector.connect_local().unwrap();
        let (third, _rx3) = inspector.connect_local().unwrap();
        inspector.tick().unwrap();
        assert_eq!(inspector.connection_count(), 3);

        drop(second);
        inspector.tick().unwrap();
        assert_eq!(inspector.connection_count(), 2);
        assert_eq!(inspector.engine().disconnect_count(), 1);

        drop(first);
        drop(third);
        inspector.tick().unwrap();
        assert_eq!(inspector.connection_count(), 0);
        assert_eq!(inspector.engine().session_count(), 0);
    }

    #[test]
    fn test_pause_then_resume() {
        let inspector = local_inspector();
        let (connection, mut rx) = inspector.connect_local().unwrap();

        connection.send(r#"{"id":1,"method":"Debugger.pause"}"#);
        connection.send(r#"{"id":2,"method":"Debugger.resume"}"#);
        inspector.tick().unwrap();

        assert!(!inspector.is_paused());
        let messages = drain(&mut rx);
        assert_eq!(messages[0]["id"], 1);
        assert_eq!(messages[1]["method"], "Debugger.paused");
        assert_eq!(messages[2]["id"], 2);
        assert_eq!(messages[3]["method"], "Debugger.resumed");
    }

    #[test]
    fn test_nested_pause_needs_one_resume() {
        let inspector = local_inspector();
        let (connection, _rx) = inspector.connect_local().unwrap();

        connection.send(r#"{"id":1,"method":"Debugger.pause"}"#);
        connection.send(r#"{"id":2,"method":"Debugger.pause"}"#);
        connection.send(r#"{"id":3,"method":"Debugger.resume"}"#);
        inspector.tick().unwrap();

        assert!(!inspector.is_paused());
        assert_eq!(inspector.engine().received().len(), 3);
    }

    #[test]
    fn test_engine_initiated_pause() {
        let inspector = local_inspector();
        let (connection, mut rx) = inspector.connect_local().unwrap();
        inspector.tick().unwrap();

        connection.send(r#"{"id":9,"method":"Debugger.resume"}"#);
        inspector.engine().request_pause(ContextGroupId(1));

        assert!(!inspector.is_paused());
        let methods: Vec<Value> = drain(&mut rx).iter().map(|m| m["method"].clone()).collect();
        assert_eq!(methods.first(), Some(&Value::from("Debugger.paused")));
        assert_eq!(methods.last(), Some(&Value::from("Debugger.resumed")));
    }

    #[test]
    fn test_hang_up_while_paused_releases_session() {
        let inspector = local_inspector();
        let (connection, mut rx) = inspector.connect_local().unwrap();

        connection.send(r#"{"id":1,"method":"Debugger.pause"}"#);
        drop(connection);
        inspector.tick().unwrap();

        assert!(!inspector.is_paused());
        assert_eq!(inspector.connection_count(), 0);
        assert_eq!(inspector.engine().session_count(), 0);
        assert_eq!(inspector.engine().disconnect_count(), 1);
        assert_eq!(drain(&mut rx)[1]["method"], "Debugger.paused");
    }

    #[test]
    fn test_failure_then_close_releases_once() {
        let inspector = local_inspector();
        let (connection, _rx) = inspector.connect_local().unwrap();
        inspector.tick().unwrap();
        assert_eq!(inspector.connection_count(), 1);

        let id = connection.id();
        let events = &inspector.core.event_tx;
        events
            .send(TransportEvent::Failure {
                id,
                reason: "connection reset".into(),
            })
            .unwrap();
        events.send(TransportEvent::Close { id }).unwrap();
        inspector.tick().unwrap();

        assert_eq!(inspector.connection_count(), 0);
        assert_eq!(inspector.engine().disconnect_count(), 1);

        drop(connection);
        inspector.tick().unwrap();
        assert_eq!(inspector.engine().disconnect_count(), 1);
    }

    #[test]
    fn test_connection_refused_by_engine_is_not_registered() {
        let inspector = local_inspector();
        inspector.engine().detach(inspector.context_group_id());

        let (sink, _outbound) = mpsc::unbounded_channel();
        let result = inspector.core.open_channel(ConnectionId::new(), sink);
        assert!(matches!(
            result,
            Err(InspectorError::Engine(EngineError::ContextNotAttached(
                ContextGroupId(1)
            )))
        ));

        let (_connection, _rx) = inspector.connect_local().unwrap();
        inspector.tick().unwrap();
        assert_eq!(inspector.connection_count(), 0);
    }

    #[test]
    fn test_pause_for_foreign_group_is_ignored() {
        let inspector = local_inspector();

        inspector.handle().run_message_loop_on_pause(ContextGroupId(42));

        assert!(!inspector.is_paused());
    }

    #[test]
    fn test_close_then_tick_is_noop() {
        let inspector = local_inspector();
        let (connection, _rx) = inspector.connect_local().unwrap();
        inspector.tick().unwrap();

        inspector.close();
        let passes = inspector.engine().maintenance_passes();

        assert!(!connection.send(r#"{"id":1,"method":"Runtime.enable"}"#));
        assert!(!inspector.tick().unwrap());
        assert_eq!(inspector.engine().maintenance_passes(), passes);
        assert!(inspector.is_closed());
        assert!(matches!(
            inspector.connect_local(),
            Err(InspectorError::Closed)
        ));
    }

    #[test]
    fn test_close_is_idempotent_and_detaches() {
        let inspector = local_inspector();
        let (_a, _rx_a) = inspector.connect_local().unwrap();
        let (_b, _rx_b) = inspector.connect_local().unwrap();
        inspector.tick().unwrap();

        inspector.close();
        inspector.close();

        assert_eq!(inspector.connection_count(), 0);
        assert_eq!(inspector.engine().disconnect_count(), 2);
        assert!(!inspector.engine().is_attached());
    }

    #[test]
    fn test_close_from_inside_pause_loop() {
        let inspector = local_inspector();
        let (connection, _rx) = inspector.connect_local().unwrap();
        let handle = inspector.handle();
        inspector.engine().schedule(move || handle.close());

        connection.send(r#"{"id":1,"method":"Debugger.pause"}"#);
        let alive = inspector.tick().unwrap();

        assert!(!alive);
        assert!(inspector.is_closed());
        assert!(!inspector.is_paused());
    }

    #[test]
    fn test_codec_fault_surfaces_on_tick() {
        let inspector = local_inspector();
        let (_connection, mut rx) = inspector.connect_local().unwrap();
        inspector.tick().unwrap();

        inspector
            .engine()
            .notify_raw(EngineString::TwoByte(&[0x7B, 0xDC00, 0x7D]));

        assert!(matches!(inspector.tick(), Err(InspectorError::Codec(_))));
        assert!(inspector.tick().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_run_if_waiting_marks_connected() {
        let inspector = local_inspector();
        let (connection, _rx) = inspector.connect_local().unwrap();
        assert!(!inspector.is_connected());

        connection.send(r#"{"id":1,"method":"Runtime.runIfWaitingForDebugger"}"#);

        assert!(inspector.wait_for_debugger().unwrap());
        assert!(inspector.is_connected());
    }

    #[test]
    fn test_wait_for_debugger_without_transport_gives_up() {
        let inspector = local_inspector();
        assert!(!inspector.wait_for_debugger().unwrap());
    }

    #[test]
    fn test_drop_closes() {
        let inspector = local_inspector();
        let handle = inspector.handle();
        let (_connection, _rx) = inspector.connect_local().unwrap();
        inspector.tick().unwrap();

        drop(inspector);

        assert!(!handle.is_alive());
        assert!(!handle.is_paused());
    }
}

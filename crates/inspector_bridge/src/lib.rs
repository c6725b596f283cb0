//! Remote-debugging bridge between an embedded script engine and debugger
//! front-ends.
//!
//! The bridge listens for debugger connections, answers the HTTP discovery
//! requests front-ends use to find it, and shuttles protocol text between
//! each connection and its engine session. It is driven by the embedder:
//! call [`Inspector::tick`] regularly from the thread that owns the engine.
//!
//! ```no_run
//! use inspector_bridge::{Inspector, LoopbackEngine};
//!
//! let inspector = Inspector::create(9229, LoopbackEngine::new());
//! while inspector.tick().unwrap_or(false) {
//!     // run the embedder's frame
//! }
//! ```

pub mod channel;
pub mod codec;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod inspector;
pub mod loopback;
pub mod registry;
pub mod transport;

pub use channel::Channel;
pub use codec::{EngineString, encode};
pub use discovery::{DiscoveryDocuments, TargetInfo};
pub use engine::{
    ContextGroupId, ContextInfo, EngineSession, InspectorClient, InspectorEngine, OutboundHandler,
};
pub use error::{CodecError, EngineError, InspectorError};
pub use inspector::{Inspector, InspectorHandle, InspectorOptions};
pub use loopback::{LoopbackEngine, LoopbackSession};
pub use registry::{ConnectionId, SessionRegistry};
pub use transport::{LocalConnection, TransportEvent, TransportListener};

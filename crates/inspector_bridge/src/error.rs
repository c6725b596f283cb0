use crate::engine::ContextGroupId;

/// Failure to convert engine protocol text into UTF-8.
///
/// These indicate the engine broke its side of the string contract and are
/// surfaced to the embedder rather than patched over.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Unpaired UTF-16 surrogate {unit:#06x} at code unit {index}")]
    UnpairedSurrogate { index: usize, unit: u16 },
}

/// Errors reported by an [`InspectorEngine`](crate::engine::InspectorEngine).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Context group {0} is not attached")]
    ContextNotAttached(ContextGroupId),
    #[error("Engine session failed: {0}")]
    Session(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InspectorError {
    #[error("Failed to start inspector transport on {host}:{port}: {source}")]
    TransportInit {
        host: String,
        port: i32,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid inspector port: {0}")]
    InvalidPort(i32),
    #[error("Inspector is closed")]
    Closed,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

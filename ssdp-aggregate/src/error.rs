use crate::ssdp::engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("invalid unicast address {0:?}")]
    InvalidAddress(String),

    #[error("device has no uuid")]
    MissingUuid,

    #[error("invalid device location {location:?}: {source}")]
    InvalidLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    #[error("engine for {address} failed: {source}")]
    Engine {
        address: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to enumerate network interfaces: {0}")]
    Network(#[source] std::io::Error),

    #[error("failed to bind description server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

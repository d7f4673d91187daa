use std::net::SocketAddr;
use thiserror::Error;

/// Errors produced by the chat relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("port {port} is already in use")]
    AddrInUse { port: u16 },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("origin rejected: {0}")]
    OriginRejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session closed: {0}")]
    SessionClosed(String),

    #[error("send queue full: {0}")]
    QueueFull(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Classify a listener bind failure, singling out an occupied port.
    pub fn from_bind(addr: SocketAddr, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::AddrInUse {
            RelayError::AddrInUse { port: addr.port() }
        } else {
            RelayError::Bind { addr, source }
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

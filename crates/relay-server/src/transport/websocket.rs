//! WebSocket endpoint.
//!
//! [`Listener`] owns the bound TCP socket and hands axum an [`Endpoint`] to
//! accept from, so the port stays bound until the server drops the listener.
//! Each incoming request is classified into a [`TransportEvent`] before any
//! session exists.

use super::origin::OriginPolicy;
use super::liveness;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use relay_core::{RelayError, RelayResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A handle to an upgraded WebSocket connection.
pub struct WebSocketConnection {
    pub socket: WebSocket,
    pub remote_addr: SocketAddr,
}

/// What an incoming request turned out to be.
pub enum TransportEvent {
    /// A valid upgrade from an allowed origin; the connection is handed over
    /// once the `101` response is out.
    ConnectionAccepted(WebSocketUpgrade),
    /// Plain HTTP request, answered with the liveness body.
    Liveness,
    /// Upgrade refused because of its origin.
    Rejected(RelayError),
    /// Malformed upgrade request.
    TransportError(WebSocketUpgradeRejection),
}

/// Classify one request. The origin check runs before anything else looks at
/// the upgrade, so a refused origin never reaches the session layer.
pub fn classify(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    headers: &HeaderMap,
    origins: &OriginPolicy,
) -> TransportEvent {
    if !liveness::is_upgrade_request(headers) {
        return TransportEvent::Liveness;
    }
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = origins.check(origin) {
        return TransportEvent::Rejected(e);
    }
    match upgrade {
        Ok(ws) => TransportEvent::ConnectionAccepted(ws),
        Err(rejection) => TransportEvent::TransportError(rejection),
    }
}

/// The bound network endpoint.
pub struct Listener {
    tcp: Arc<TcpListener>,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind the endpoint. An occupied port is reported as
    /// [`RelayError::AddrInUse`].
    pub async fn bind(addr: SocketAddr) -> RelayResult<Self> {
        let tcp = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::from_bind(addr, e))?;
        let local_addr = tcp.local_addr()?;
        info!(addr = %local_addr, "listener bound");
        Ok(Self {
            tcp: Arc::new(tcp),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept side of the endpoint, for `axum::serve`. Dropping it stops
    /// accepting but keeps the port bound.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            tcp: self.tcp.clone(),
        }
    }
}

/// Shared accept handle on the bound socket.
pub struct Endpoint {
    tcp: Arc<TcpListener>,
}

impl axum::serve::Listener for Endpoint {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.tcp.accept().await {
                Ok(conn) => return conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.tcp.local_addr()
    }
}

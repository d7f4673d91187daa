//! Core server: serves the relay endpoint and runs one task per session.
//!
//! Owns the bound listener and the session manager. Shutdown is ordered:
//! stop accepting, signal every session and wait for it to finish, then
//! release the listener.

use crate::config::ServerConfig;
use crate::relay::{BroadcastRouter, ConnectionRegistry};
use crate::session::{OpenedSession, SessionManager};
use crate::transport::websocket::{self, Listener, TransportEvent, WebSocketConnection};
use crate::transport::{liveness, OriginPolicy};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::serve::ListenerExt;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use relay_core::RelayResult;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Upper bound on sending the close frame to a peer that stopped reading.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// State shared by every request handler and session task.
struct Shared {
    sessions: Arc<SessionManager>,
    origins: OriginPolicy,
    tasks: TaskTracker,
}

/// The chat relay server instance.
pub struct RelayServer {
    config: ServerConfig,
    listener: Listener,
    shared: Arc<Shared>,
}

impl RelayServer {
    /// Bind the endpoint. Fails if the port is taken or the bind is refused.
    pub async fn bind(config: ServerConfig) -> RelayResult<Self> {
        let listener = Listener::bind(config.bind_addr()).await?;

        let registry = Arc::new(ConnectionRegistry::new());
        let router = BroadcastRouter::new(config.echo_to_sender);
        let sessions = Arc::new(SessionManager::new(registry, router, config.send_queue));
        let shared = Arc::new(Shared {
            sessions,
            origins: OriginPolicy::new(&config.allowed_origins),
            tasks: TaskTracker::new(),
        });

        Ok(Self {
            config,
            listener,
            shared,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Access the session manager.
    pub fn sessions(&self) -> Arc<SessionManager> {
        self.shared.sessions.clone()
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()>,
    {
        let accepting = CancellationToken::new();
        let stop_accepting = accepting.clone();
        let app = build_router(self.shared.clone())
            .into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(self.listener.endpoint().tap_io(|_| {}), app)
            .with_graceful_shutdown(async move { stop_accepting.cancelled().await });
        let mut serving = tokio::spawn(async move { serve.await });

        info!(
            addr = %self.local_addr(),
            origins = %self.shared.origins.describe(),
            echo = self.config.echo_to_sender,
            "chat relay ready"
        );

        shutdown.await;

        let open = self.shared.sessions.registry().len().await;
        info!(open, "shutting down, no longer accepting connections");
        accepting.cancel();
        self.shared.sessions.close_all();
        self.shared.tasks.close();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        match tokio::time::timeout_at(deadline, &mut serving).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "endpoint stopped with an error"),
            Ok(Err(e)) => warn!(error = %e, "endpoint task failed"),
            Err(_) => {
                warn!("requests still in flight, aborting");
                serving.abort();
                let _ = serving.await;
            }
        }
        if tokio::time::timeout_at(deadline, self.shared.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.shared.tasks.len(),
                "sessions did not close in time"
            );
        }
        info!("sessions closed");

        drop(self.listener);
        info!("listener released");
        Ok(())
    }
}

fn build_router(shared: Arc<Shared>) -> Router {
    Router::new().fallback(entry).with_state(shared)
}

/// Every request on the relay port lands here: upgrades become sessions,
/// everything else gets the liveness body.
async fn entry(
    State(shared): State<Arc<Shared>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match websocket::classify(upgrade, &headers, &shared.origins) {
        TransportEvent::ConnectionAccepted(ws) => {
            // Held until the session ends so shutdown waits for it.
            let task = shared.tasks.token();
            ws.on_failed_upgrade(move |e| {
                warn!(remote = %remote, error = %e, "upgrade failed");
            })
            .on_upgrade(move |socket| async move {
                let _task = task;
                let conn = WebSocketConnection {
                    socket,
                    remote_addr: remote,
                };
                handle_connection(&shared.sessions, conn).await;
            })
        }
        TransportEvent::Liveness => {
            debug!(remote = %remote, "plain HTTP request");
            liveness::response()
        }
        TransportEvent::Rejected(e) => {
            info!(remote = %remote, reason = %e, "connection rejected");
            (StatusCode::FORBIDDEN, e.to_string()).into_response()
        }
        TransportEvent::TransportError(rejection) => {
            warn!(remote = %remote, error = %rejection, "malformed upgrade request");
            rejection.into_response()
        }
    }
}

/// Run one upgraded connection through its whole session.
async fn handle_connection(sessions: &SessionManager, conn: WebSocketConnection) {
    if sessions.is_shutting_down() {
        let mut socket = conn.socket;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    session_loop(sessions, conn).await;
}

/// Pump one session: inbound frames go to the router, queued lines go out.
async fn session_loop(sessions: &SessionManager, conn: WebSocketConnection) {
    let (mut sink, mut stream) = conn.socket.split();
    let OpenedSession {
        mut session,
        mut outbound,
        closing,
    } = sessions.open(conn.remote_addr).await;

    loop {
        tokio::select! {
            _ = closing.cancelled() => {
                debug!(session_id = %session.id, "session told to close");
                break;
            }

            queued = outbound.recv() => match queued {
                Some(text) => {
                    // A peer that stopped reading must not block a close.
                    let written = tokio::select! {
                        written = sink.send(Message::Text(text.into())) => written,
                        _ = closing.cancelled() => break,
                    };
                    if let Err(e) = written {
                        warn!(session_id = %session.id, error = %e, "write failed");
                        break;
                    }
                }
                None => break,
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    sessions.relay(&session, text.as_str().to_owned()).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(session_id = %session.id, "peer closed");
                    break;
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(session_id = %session.id, len = data.len(), "binary frame ignored");
                }
                // Ping/pong are answered by the WebSocket layer.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session_id = %session.id, error = %e, "read failed");
                    break;
                }
            },
        }
    }

    sessions.close(&mut session).await;
    let farewell = async {
        let _ = sink.send(Message::Close(None)).await;
        sink.close().await
    };
    match tokio::time::timeout(CLOSE_GRACE, farewell).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!(session_id = %session.id, error = %e, "close after teardown failed");
        }
        Err(_) => debug!(session_id = %session.id, "peer did not take the close frame"),
    }
}

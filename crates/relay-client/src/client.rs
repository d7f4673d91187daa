//! The chat client.
//!
//! `ChatClient` owns one logical connection to a relay. A supervisor task
//! holds the socket, publishes [`ConnectionState`] changes on a watch channel
//! and reconnects after drops the caller did not ask for. Lines sent while
//! the connection is down are queued and flushed once it is back.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use relay_core::{RelayError, RelayResult};

use crate::state::{ConnectionState, ReconnectPolicy};
use crate::transport::{self, WsStream};

/// Configuration for connecting to a relay.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `ws://` or `wss://` URL of the relay.
    pub url: String,
    /// Value of the `Origin` header sent with the upgrade request.
    pub origin: Option<String>,
    /// Retry behaviour after a lost connection.
    pub reconnect: ReconnectPolicy,
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3001".to_string(),
            origin: Some("http://localhost:3000".to_string()),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// How a connected period ended.
enum Ended {
    /// The caller asked to stop.
    Stopped,
    /// The connection dropped.
    Dropped,
}

/// A connection to a chat relay.
pub struct ChatClient {
    outgoing_tx: mpsc::UnboundedSender<String>,
    incoming_rx: mpsc::UnboundedReceiver<String>,
    state_rx: watch::Receiver<ConnectionState>,
    stop_tx: watch::Sender<bool>,
    supervisor: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Connect to a relay and wait until the connection is open.
    ///
    /// The initial connect is retried under the same policy as a dropped
    /// connection; an error is returned once the client reaches `Failed`.
    pub async fn connect(config: ClientConfig) -> RelayResult<Self> {
        transport::validate_url(&config.url)?;

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<String>();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (stop_tx, stop_rx) = watch::channel(false);

        let supervisor = tokio::spawn(supervise(
            config.clone(),
            state_tx,
            outgoing_rx,
            incoming_tx,
            stop_rx,
        ));

        let mut client = Self {
            outgoing_tx,
            incoming_rx,
            state_rx,
            stop_tx,
            supervisor: Some(supervisor),
        };

        let mut watcher = client.state_rx.clone();
        let settled = watcher
            .wait_for(|s| s.is_open() || s.is_finished())
            .await
            .map(|s| *s)
            .unwrap_or(ConnectionState::Failed);

        if settled.is_open() {
            Ok(client)
        } else {
            if let Some(handle) = client.supervisor.take() {
                let _ = handle.await;
            }
            Err(RelayError::Transport(format!(
                "could not connect to {} after {} retries",
                config.url, config.reconnect.max_retries
            )))
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Queue a chat message. Fails once the client has stopped.
    pub fn send(&self, text: impl Into<String>) -> RelayResult<()> {
        let state = self.state();
        if state.is_finished() {
            return Err(RelayError::SessionClosed(format!("client is {state}")));
        }
        self.outgoing_tx
            .send(text.into())
            .map_err(|_| RelayError::SessionClosed("client stopped".into()))
    }

    /// Next received line. `None` once the client has stopped and every
    /// buffered line has been read.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming_rx.recv().await
    }

    /// Close the connection and stop reconnecting.
    pub async fn disconnect(mut self) -> RelayResult<()> {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.supervisor.take() {
            handle
                .await
                .map_err(|e| RelayError::Other(format!("client supervisor failed: {e}")))?;
        }
        Ok(())
    }
}

/// Drive the connection until stopped or until retries run out.
async fn supervise(
    config: ClientConfig,
    state_tx: watch::Sender<ConnectionState>,
    mut outgoing_rx: mpsc::UnboundedReceiver<String>,
    incoming_tx: mpsc::UnboundedSender<String>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let policy = config.reconnect;
    let mut attempt: u32 = 0;

    loop {
        state_tx.send_replace(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        });

        let attempt_connect = transport::connect(
            &config.url,
            config.origin.as_deref(),
            config.connect_timeout,
        );
        let connected = tokio::select! {
            result = attempt_connect => result,
            _ = stop_rx.changed() => {
                state_tx.send_replace(ConnectionState::Idle);
                return;
            }
        };

        match connected {
            Ok(ws) => {
                info!(url = %config.url, "connected");
                state_tx.send_replace(ConnectionState::Open);
                match pump(ws, &mut outgoing_rx, &incoming_tx, &mut stop_rx).await {
                    Ended::Stopped => {
                        state_tx.send_replace(ConnectionState::Idle);
                        return;
                    }
                    Ended::Dropped => {
                        warn!(url = %config.url, "connection lost");
                        attempt = 0;
                    }
                }
            }
            Err(e) => {
                warn!(url = %config.url, attempt, error = %e, "connect failed");
            }
        }

        attempt = match policy.next_attempt(attempt) {
            Some(next) => next,
            None => {
                warn!(url = %config.url, retries = policy.max_retries, "giving up");
                state_tx.send_replace(ConnectionState::Failed);
                return;
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(policy.backoff) => {}
            _ = stop_rx.changed() => {
                state_tx.send_replace(ConnectionState::Idle);
                return;
            }
        }
    }
}

/// Move frames between the socket and the client's queues.
async fn pump(
    ws: WsStream,
    outgoing_rx: &mut mpsc::UnboundedReceiver<String>,
    incoming_tx: &mpsc::UnboundedSender<String>,
    stop_rx: &mut watch::Receiver<bool>,
) -> Ended {
    let (mut sink, mut stream) = ws.split();

    let ended = loop {
        tokio::select! {
            _ = stop_rx.changed() => break Ended::Stopped,

            outgoing = outgoing_rx.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        debug!(error = %e, "send failed");
                        break Ended::Dropped;
                    }
                }
                // Every ChatClient handle is gone.
                None => break Ended::Stopped,
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = incoming_tx.send(text.to_string());
                }
                Some(Ok(Message::Close(_))) | None => break Ended::Dropped,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "read failed");
                    break Ended::Dropped;
                }
            },
        }
    };

    if matches!(ended, Ended::Stopped) {
        let _ = sink.send(Message::Close(None)).await;
    }
    let _ = sink.close().await;
    ended
}

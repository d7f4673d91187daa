//! Session lifecycle management.
//!
//! Owns the mapping between an accepted connection and its registry entry.
//! Every registry mutation is paired with its notice broadcast under a single
//! registry guard, so no session ever hears about a departure for an id that
//! is still registered, and nothing is routed to an id already removed.

use crate::relay::{
    BroadcastRouter, ConnectionRegistry, Delivery, Outbound, RegistryGuard, SessionHandle,
};
use relay_core::{ChatLine, Notice, SessionId, SessionIdAllocator};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of one session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// A session as seen by its own connection task.
#[derive(Debug)]
pub struct Session {
    /// Identifier allocated when the session opened.
    pub id: SessionId,
    /// Peer address of the connection.
    pub remote_addr: SocketAddr,
    state: SessionState,
    opened_at: Instant,
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.state
    }
}

/// A freshly opened session, the queue its writer drains and the token that
/// tells it to close.
pub struct OpenedSession {
    pub session: Session,
    pub outbound: Outbound,
    pub closing: CancellationToken,
}

/// Manages all open sessions.
pub struct SessionManager {
    registry: Arc<ConnectionRegistry>,
    router: BroadcastRouter,
    ids: SessionIdAllocator,
    queue_capacity: usize,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// `queue_capacity` bounds each session's outbound queue; a session that
    /// falls that far behind is disconnected.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: BroadcastRouter,
        queue_capacity: usize,
    ) -> Self {
        Self {
            registry,
            router,
            ids: SessionIdAllocator::new(),
            queue_capacity: queue_capacity.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Number of session ids handed out since start.
    pub fn allocated(&self) -> u64 {
        self.ids.allocated()
    }

    /// Tell every session, open now or opened later, to close.
    pub fn close_all(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Register a newly accepted connection.
    ///
    /// The new session is sent its welcome notice first, then every session
    /// (itself included) is told about the join.
    pub async fn open(&self, remote_addr: SocketAddr) -> OpenedSession {
        let (tx, outbound) = mpsc::channel(self.queue_capacity);
        let closing = self.shutdown.child_token();
        let mut session = Session {
            id: self.ids.allocate(),
            remote_addr,
            state: SessionState::Connecting,
            opened_at: Instant::now(),
        };
        let handle = SessionHandle::new(session.id.clone(), remote_addr, tx, closing.clone());

        let mut registry = self.registry.lock().await;
        let welcome = ChatLine::from(Notice::Welcome(session.id.clone()));
        if let Err(e) = handle.deliver(welcome.render()) {
            warn!(session_id = %session.id, error = %e, "welcome not delivered");
        }
        // Ids are unique by construction; a failed insert is a bug upstream.
        if !registry.insert(handle) {
            warn!(session_id = %session.id, "session id already registered");
        }
        session.state = SessionState::Open;
        let joined = ChatLine::from(Notice::Joined(session.id.clone()));
        let outcome = self.router.broadcast(&registry, &joined, None);
        self.disconnect_lagging(&mut registry, outcome.lagging);
        let open = registry.len();
        drop(registry);

        info!(session_id = %session.id, remote = %remote_addr, open, "session opened");
        OpenedSession {
            session,
            outbound,
            closing,
        }
    }

    /// Fan a message from `session` out to the registry.
    pub async fn relay(&self, session: &Session, text: String) -> Delivery {
        debug!(session_id = %session.id, len = text.len(), "chat message");
        let mut registry = self.registry.lock().await;
        if registry.get(&session.id).is_none() {
            warn!(session_id = %session.id, "message from unregistered session dropped");
            return Delivery::default();
        }
        let outcome = self.router.relay(&registry, &session.id, text);
        self.disconnect_lagging(&mut registry, outcome.lagging.clone());
        outcome
    }

    /// Tear a session down and announce the departure to everyone left.
    ///
    /// Returns `false` if the session was already closed, or had already been
    /// removed for falling behind.
    pub async fn close(&self, session: &mut Session) -> bool {
        if session.state == SessionState::Closed {
            return false;
        }

        let mut registry = self.registry.lock().await;
        let removed = registry.remove(&session.id).is_some();
        session.state = SessionState::Closed;
        if removed {
            let left = ChatLine::from(Notice::Left(session.id.clone()));
            let outcome = self.router.broadcast(&registry, &left, None);
            self.disconnect_lagging(&mut registry, outcome.lagging);
        }
        let open = registry.len();
        drop(registry);

        info!(
            session_id = %session.id,
            remote = %session.remote_addr,
            open,
            duration_secs = session.opened_at.elapsed().as_secs(),
            "session closed"
        );
        removed
    }

    /// Remove sessions whose queue overflowed and announce their departure.
    /// Each departure notice can overflow further queues, so this runs until
    /// no session is left behind.
    fn disconnect_lagging(&self, registry: &mut RegistryGuard<'_>, mut lagging: Vec<SessionId>) {
        while let Some(id) = lagging.pop() {
            let Some(handle) = registry.remove(&id) else {
                continue;
            };
            warn!(
                session_id = %id,
                remote = %handle.remote_addr,
                "send queue full, disconnecting slow session"
            );
            handle.disconnect();
            let left = ChatLine::from(Notice::Left(id));
            let outcome = self.router.broadcast(registry, &left, None);
            lagging.extend(outcome.lagging);
        }
    }
}

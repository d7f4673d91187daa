//! Connection registry.
//!
//! The authoritative set of open sessions, keyed by session id. A session is
//! present exactly while its connection is open. Inserts and removals happen
//! through a [`RegistryGuard`], so the session manager can pair a mutation with
//! its notice broadcast under one lock.

use relay_core::{RelayError, RelayResult, SessionId};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Queue of outbound `chat message` frames drained by a session's writer.
pub type Outbound = mpsc::Receiver<String>;

/// The registry's view of one open session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Session identifier (registry key).
    pub id: SessionId,
    /// Peer address, for diagnostics.
    pub remote_addr: SocketAddr,
    /// Writer queue of the session task.
    tx: mpsc::Sender<String>,
    /// Cancelled to make the session task close its connection.
    closing: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        remote_addr: SocketAddr,
        tx: mpsc::Sender<String>,
        closing: CancellationToken,
    ) -> Self {
        Self {
            id,
            remote_addr,
            tx,
            closing,
        }
    }

    /// Queue a text frame. Never suspends: a full queue is an error.
    pub fn deliver(&self, text: String) -> RelayResult<()> {
        self.tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::QueueFull(self.id.to_string()),
            TrySendError::Closed(_) => RelayError::SessionClosed(self.id.to_string()),
        })
    }

    /// Ask the session task to close its connection.
    pub fn disconnect(&self) {
        self.closing.cancel();
    }
}

/// Registry of open sessions.
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the registry. Do not hold the guard across a suspending wait.
    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            sessions: self.sessions.lock().await,
        }
    }

    /// Number of open sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    /// Ids of all open sessions.
    pub async fn ids(&self) -> Vec<SessionId> {
        self.sessions.lock().await.keys().cloned().collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the registry.
pub struct RegistryGuard<'a> {
    sessions: MutexGuard<'a, HashMap<SessionId, SessionHandle>>,
}

impl RegistryGuard<'_> {
    /// Insert a session. Returns `false` and leaves the registry untouched
    /// if the id is already present.
    pub(crate) fn insert(&mut self, handle: SessionHandle) -> bool {
        if self.sessions.contains_key(&handle.id) {
            return false;
        }
        debug!(session_id = %handle.id, "session registered");
        self.sessions.insert(handle.id.clone(), handle);
        true
    }

    /// Remove a session by id.
    pub(crate) fn remove(&mut self, id: &SessionId) -> Option<SessionHandle> {
        let removed = self.sessions.remove(id);
        if removed.is_some() {
            debug!(session_id = %id, "session unregistered");
        }
        removed
    }

    pub fn get(&self, id: &SessionId) -> Option<&SessionHandle> {
        self.sessions.get(id)
    }

    /// Point-in-time copy of every open session.
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::SessionIdAllocator;

    fn handle(alloc: &SessionIdAllocator) -> (SessionHandle, Outbound) {
        handle_with_capacity(alloc, 16)
    }

    fn handle_with_capacity(
        alloc: &SessionIdAllocator,
        capacity: usize,
    ) -> (SessionHandle, Outbound) {
        let (tx, rx) = mpsc::channel(capacity);
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let handle = SessionHandle::new(alloc.allocate(), addr, tx, CancellationToken::new());
        (handle, rx)
    }

    #[tokio::test]
    async fn insert_and_remove() {
        let alloc = SessionIdAllocator::new();
        let registry = ConnectionRegistry::new();
        let (h, _rx) = handle(&alloc);
        let id = h.id.clone();

        assert!(registry.lock().await.insert(h));
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(&id).await);

        assert!(registry.lock().await.remove(&id).is_some());
        assert!(registry.is_empty().await);
        assert!(registry.lock().await.remove(&id).is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let alloc = SessionIdAllocator::new();
        let registry = ConnectionRegistry::new();
        let (h, _rx) = handle(&alloc);

        let mut guard = registry.lock().await;
        assert!(guard.insert(h.clone()));
        assert!(!guard.insert(h));
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test]
    async fn deliver_after_receiver_dropped_fails() {
        let alloc = SessionIdAllocator::new();
        let (h, rx) = handle(&alloc);
        h.deliver("hi".into()).unwrap();
        drop(rx);
        assert!(matches!(
            h.deliver("again".into()),
            Err(RelayError::SessionClosed(_))
        ));
    }

    #[tokio::test]
    async fn deliver_to_full_queue_fails_without_waiting() {
        let alloc = SessionIdAllocator::new();
        let (h, mut rx) = handle_with_capacity(&alloc, 2);
        h.deliver("one".into()).unwrap();
        h.deliver("two".into()).unwrap();
        assert!(matches!(
            h.deliver("three".into()),
            Err(RelayError::QueueFull(_))
        ));

        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        h.deliver("three".into()).unwrap();
    }

    #[tokio::test]
    async fn disconnect_cancels_session_token() {
        let alloc = SessionIdAllocator::new();
        let (tx, _rx) = mpsc::channel(1);
        let closing = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let h = SessionHandle::new(alloc.allocate(), addr, tx, closing.clone());

        h.clone().disconnect();
        assert!(closing.is_cancelled());
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_registry() {
        let alloc = SessionIdAllocator::new();
        let registry = ConnectionRegistry::new();
        let (a, _ra) = handle(&alloc);
        let (b, _rb) = handle(&alloc);
        let a_id = a.id.clone();

        let snapshot = {
            let mut guard = registry.lock().await;
            guard.insert(a);
            guard.insert(b);
            guard.snapshot()
        };
        registry.lock().await.remove(&a_id);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_inserts_and_removes() {
        let alloc = std::sync::Arc::new(SessionIdAllocator::new());
        let registry = std::sync::Arc::new(ConnectionRegistry::new());

        let mut tasks = Vec::new();
        for i in 0..50 {
            let alloc = alloc.clone();
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (h, rx) = handle(&alloc);
                let id = h.id.clone();
                registry.lock().await.insert(h);
                tokio::task::yield_now().await;
                if i % 2 == 0 {
                    registry.lock().await.remove(&id);
                }
                (id, rx)
            }));
        }
        let mut kept = Vec::new();
        for t in tasks {
            kept.push(t.await.unwrap());
        }

        assert_eq!(registry.len().await, 25);
        let ids = registry.ids().await;
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }
}

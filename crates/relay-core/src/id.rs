//! Session identifiers.
//!
//! An identifier pairs a random alphanumeric token (what clients see) with a
//! process-wide sequence number, so two sessions never compare equal even if
//! their tokens happen to collide.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Length of the random token part of a session identifier.
pub const TOKEN_LEN: usize = 20;

/// Number of leading token characters used to tag a speaker.
pub const SHORT_ID_LEN: usize = 5;

/// Identifier of one live (or once-live) session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId {
    seq: u64,
    token: String,
}

impl SessionId {
    /// The full token shown to the session's own client.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Abbreviated rendering used to prefix messages and notices.
    pub fn short(&self) -> &str {
        let end = self
            .token
            .char_indices()
            .nth(SHORT_ID_LEN)
            .map(|(i, _)| i)
            .unwrap_or(self.token.len());
        &self.token[..end]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Hands out session identifiers that are never reused within the process.
#[derive(Debug)]
pub struct SessionIdAllocator {
    next_seq: AtomicU64,
}

impl SessionIdAllocator {
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh identifier.
    pub fn allocate(&self) -> SessionId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        SessionId { seq, token }
    }

    /// Number of identifiers handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next_seq.load(Ordering::Relaxed) - 1
    }
}

impl Default for SessionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn token_shape() {
        let id = SessionIdAllocator::new().allocate();
        assert_eq!(id.token().len(), TOKEN_LEN);
        assert!(id.token().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(id.to_string(), id.token());
    }

    #[test]
    fn short_is_token_prefix() {
        let id = SessionIdAllocator::new().allocate();
        assert_eq!(id.short().len(), SHORT_ID_LEN);
        assert!(id.token().starts_with(id.short()));
    }

    #[test]
    fn ids_never_repeat() {
        let alloc = SessionIdAllocator::new();
        let ids: HashSet<SessionId> = (0..1000).map(|_| alloc.allocate()).collect();
        assert_eq!(ids.len(), 1000);
        assert_eq!(alloc.allocated(), 1000);
    }

    #[test]
    fn equal_tokens_with_different_seq_differ() {
        let a = SessionId { seq: 1, token: "abcde".into() };
        let b = SessionId { seq: 2, token: "abcde".into() };
        assert_ne!(a, b);
        assert_eq!(a.short(), b.short());
    }

    #[test]
    fn short_of_short_token() {
        let id = SessionId { seq: 1, token: "ab".into() };
        assert_eq!(id.short(), "ab");
    }
}

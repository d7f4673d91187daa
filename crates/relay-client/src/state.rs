//! Connection state machine and reconnection policy.

use std::fmt;
use std::time::Duration;

/// Where a client connection currently stands.
///
/// ```text
/// Idle -> Connecting -> Open -> Reconnecting{n} -> Open
///                  \                  \
///                   -> Reconnecting    -> Failed (retries exhausted)
/// ```
///
/// `disconnect` returns any state to `Idle`. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Failed,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// No supervisor is driving the connection any more.
    pub fn is_finished(&self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("idle"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Open => f.write_str("open"),
            ConnectionState::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {attempt})")
            }
            ConnectionState::Failed => f.write_str("failed"),
        }
    }
}

/// How many times, and how often, to retry a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts tolerated before giving up.
    pub max_retries: u32,
    /// Fixed delay before each retry.
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

impl ReconnectPolicy {
    /// Never retry.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// The retry that follows `attempt` (0 = the initial connect), or `None`
    /// once the budget is spent.
    pub fn next_attempt(&self, attempt: u32) -> Option<u32> {
        (attempt < self.max_retries).then_some(attempt + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_are_capped() {
        let policy = ReconnectPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(10),
        };
        assert_eq!(policy.next_attempt(0), Some(1));
        assert_eq!(policy.next_attempt(2), Some(3));
        assert_eq!(policy.next_attempt(3), None);
    }

    #[test]
    fn disabled_policy_never_retries() {
        assert_eq!(ReconnectPolicy::disabled().next_attempt(0), None);
    }

    #[test]
    fn finished_states() {
        assert!(ConnectionState::Idle.is_finished());
        assert!(ConnectionState::Failed.is_finished());
        assert!(!ConnectionState::Open.is_finished());
        assert!(!ConnectionState::Reconnecting { attempt: 1 }.is_finished());
        assert!(ConnectionState::Open.is_open());
    }

    #[test]
    fn display() {
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
        assert_eq!(ConnectionState::Open.to_string(), "open");
    }
}

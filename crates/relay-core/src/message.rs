//! Chat lines carried by outbound `chat message` frames.
//!
//! Every frame the relay writes is plain UTF-8 text. A line is either a
//! user message tagged with the speaker's short id, or a system notice
//! tagged with [`SYSTEM_PREFIX`].

use crate::id::SessionId;
use std::fmt;

/// Marker that starts every system notice.
pub const SYSTEM_PREFIX: &str = "System:";

/// The fixed set of notices the relay emits on its own behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Sent once, only to a newly opened session.
    Welcome(SessionId),
    /// Broadcast when a session opens.
    Joined(SessionId),
    /// Broadcast when a session closes.
    Left(SessionId),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Welcome(id) => write!(f, "{SYSTEM_PREFIX} Welcome! Your ID is {id}"),
            Notice::Joined(id) => write!(f, "{SYSTEM_PREFIX} User {} has connected.", id.short()),
            Notice::Left(id) => write!(f, "{SYSTEM_PREFIX} User {} has disconnected.", id.short()),
        }
    }
}

/// One outbound chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine {
    User { sender: SessionId, text: String },
    System(Notice),
}

impl ChatLine {
    pub fn user(sender: SessionId, text: impl Into<String>) -> Self {
        ChatLine::User {
            sender,
            text: text.into(),
        }
    }

    /// Render the wire text.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatLine::User { sender, text } => write!(f, "{}: {text}", sender.short()),
            ChatLine::System(notice) => notice.fmt(f),
        }
    }
}

impl From<Notice> for ChatLine {
    fn from(notice: Notice) -> Self {
        ChatLine::System(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SessionIdAllocator;

    #[test]
    fn welcome_carries_full_id() {
        let id = SessionIdAllocator::new().allocate();
        let line = ChatLine::from(Notice::Welcome(id.clone()));
        assert_eq!(line.render(), format!("System: Welcome! Your ID is {}", id.token()));
    }

    #[test]
    fn join_and_leave_use_short_id() {
        let id = SessionIdAllocator::new().allocate();
        assert_eq!(
            Notice::Joined(id.clone()).to_string(),
            format!("System: User {} has connected.", id.short())
        );
        assert_eq!(
            Notice::Left(id.clone()).to_string(),
            format!("System: User {} has disconnected.", id.short())
        );
    }

    #[test]
    fn user_line_is_prefixed() {
        let id = SessionIdAllocator::new().allocate();
        let line = ChatLine::user(id.clone(), "hello");
        assert_eq!(line.render(), format!("{}: hello", id.short()));
        assert!(matches!(line, ChatLine::User { ref sender, .. } if *sender == id));
    }

    #[test]
    fn system_lines_carry_the_marker() {
        let id = SessionIdAllocator::new().allocate();
        let line = ChatLine::from(Notice::Left(id.clone()));
        assert!(line.render().starts_with(SYSTEM_PREFIX));
        assert_eq!(line, ChatLine::System(Notice::Left(id)));
    }

    #[test]
    fn empty_payload_still_prefixed() {
        let id = SessionIdAllocator::new().allocate();
        assert_eq!(ChatLine::user(id.clone(), "").render(), format!("{}: ", id.short()));
    }
}

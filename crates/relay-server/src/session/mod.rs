//! Session lifecycle: open, relay, close.

pub mod manager;

pub use manager::{OpenedSession, Session, SessionManager, SessionState};

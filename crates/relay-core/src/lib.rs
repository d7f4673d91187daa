//! relay-core: shared types for the chat relay.
//!
//! Provides session identifiers, the closed set of chat lines the relay
//! renders onto the wire, and the error type used by every crate.

pub mod error;
pub mod id;
pub mod message;

// Re-export commonly used items at crate root.
pub use error::{RelayError, RelayResult};
pub use id::{SessionId, SessionIdAllocator, SHORT_ID_LEN};
pub use message::{ChatLine, Notice, SYSTEM_PREFIX};

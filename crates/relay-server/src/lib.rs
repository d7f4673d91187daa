//! relay-server: real-time chat relay.
//!
//! Accepts WebSocket clients on one TCP port, gives each a session, and fans
//! every text message out to all open sessions with join/leave notices.
//! Plain HTTP requests on the same port get a liveness response.

pub mod config;
pub mod relay;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{Overrides, ServerConfig};
pub use server::RelayServer;

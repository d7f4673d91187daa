//! relay-client: Rust client library for the chat relay.
//!
//! A [`ChatClient`] owns its connection explicitly: `connect` starts it,
//! `disconnect` ends it, and nothing is shared behind module state. A
//! supervisor task drives the connection through [`ConnectionState`] and
//! reconnects after unexpected drops according to a [`ReconnectPolicy`].
//!
//! # Quick Start
//!
//! ```no_run
//! use relay_client::{ChatClient, ClientConfig};
//!
//! # async fn example() -> relay_core::RelayResult<()> {
//! let mut client = ChatClient::connect(ClientConfig::new("ws://localhost:3001")).await?;
//! client.send("hello")?;
//! while let Some(line) = client.recv().await {
//!     println!("{line}");
//! }
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod state;
pub mod transport;

// Re-export primary public types.
pub use client::{ChatClient, ClientConfig};
pub use state::{ConnectionState, ReconnectPolicy};

// Re-export relay-core error types for convenience.
pub use relay_core::{RelayError, RelayResult};

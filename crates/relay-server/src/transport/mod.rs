//! Network endpoint: TCP listener, origin check, WebSocket upgrade and the
//! plain-HTTP liveness response.

pub mod liveness;
pub mod origin;
pub mod websocket;

pub use origin::OriginPolicy;
pub use websocket::{Endpoint, Listener, TransportEvent, WebSocketConnection};

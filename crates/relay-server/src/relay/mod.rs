//! Connection registry and broadcast fan-out.

pub mod registry;
pub mod router;

pub use registry::{ConnectionRegistry, Outbound, RegistryGuard, SessionHandle};
pub use router::{BroadcastRouter, Delivery};

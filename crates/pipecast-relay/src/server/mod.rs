//! Transport adapter: WebSocket framing, per-connection dispatch, routes.

pub mod connection;
pub mod protocol;
pub mod routes;
mod socket;

pub use connection::RelayConnection;
pub use protocol::{InboundEvent, ProtocolError, ServerMessage, StartStream};
pub use routes::{AppState, build_router};

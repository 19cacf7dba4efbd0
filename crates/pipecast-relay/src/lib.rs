//! PipeCast Relay Library
//!
//! Core functionality for the PipeCast relay:
//! - Encoder subprocess handles with lifecycle events
//! - Pending-chunk buffering until the encoder is ready
//! - Per-connection relay session state machine
//! - Session registry keyed by connection
//! - WebSocket transport adapter and HTTP routes

pub mod buffer;
pub mod encoder;
pub mod registry;
pub mod server;
pub mod session;

//! Pending-chunk buffering.
//!
//! Chunks that arrive while an encoder is still starting are held here and
//! handed over, in arrival order, at the readiness edge.

mod pending;

pub use pending::{BufferError, ChunkBuffer, PushOutcome};
pub use pipecast_core::OverflowPolicy;

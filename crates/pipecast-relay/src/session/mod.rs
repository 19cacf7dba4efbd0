//! Per-connection relay sessions.
//!
//! A session owns at most one encoder process and the chunks buffered while
//! that process starts. All transitions go through [`RelaySession`].

mod relay;
mod state;
mod types;

pub use relay::RelaySession;
pub use state::SessionState;
pub use types::{ChunkOutcome, ConnectionId, DropReason, SessionStats, StreamStatus};

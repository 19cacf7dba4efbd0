//! Relay session types.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::buffer::BufferError;
use crate::encoder::WriteError;

/// Identity of one transport connection, and of the session bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of the outbound `stream-status` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Started,
    Ended,
    Stopped,
    Error(String),
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Ended => f.write_str("ended"),
            Self::Stopped => f.write_str("stopped"),
            Self::Error(message) => write!(f, "error:{message}"),
        }
    }
}

impl Serialize for StreamStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What happened to an inbound chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Queued on the encoder's input pipe.
    Written,
    /// Held until the encoder is ready.
    Buffered,
    /// The encoder refused the write. The session state is unchanged; the
    /// process's terminal event follows.
    WriteFailed(WriteError),
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// No stream is starting or running.
    NoActiveStream,
    Overflow(BufferError),
}

/// Running counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub chunks_relayed: u64,
    pub bytes_relayed: u64,
    pub chunks_dropped: u64,
    pub write_failures: u64,
    /// Encoder processes started over the session's life.
    pub processes_started: u64,
}

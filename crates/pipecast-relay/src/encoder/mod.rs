//! Encoder subprocess handles.
//!
//! A [`Transcoder`] starts one encoder process per stream; the returned
//! [`TranscoderProcess`] accepts media bytes and reports its lifecycle on an
//! event channel. Each process instance gets a unique [`ProcessId`] so that
//! events from a discarded instance can be told apart from the current one.

mod destination;
mod ffmpeg;
#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

pub use destination::{Destination, DestinationError};
pub use ffmpeg::{FfmpegProcess, FfmpegTranscoder, build_args};

/// Identifier of one encoder process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Allocate the next process-wide unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enc-{}", self.0)
    }
}

/// Lifecycle notification emitted by an encoder process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvent {
    pub process: ProcessId,
    pub kind: ProcessEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEventKind {
    /// Readiness edge: the encoder is attached to its input pipe.
    /// `command_line` has the stream key redacted.
    Started { command_line: String },
    /// Graceful exit. Terminal.
    Ended,
    /// Spawn failure, abnormal exit, lost input or kill. Terminal.
    Errored(String),
}

impl ProcessEventKind {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. })
    }
}

/// Channel on which encoder processes report lifecycle events.
pub type EventSender = mpsc::UnboundedSender<ProcessEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ProcessEvent>;

/// Starts encoder processes.
pub trait Transcoder: Send + Sync {
    /// Start an encoder writing to `destination`.
    ///
    /// Returns immediately. Readiness arrives later as a
    /// [`ProcessEventKind::Started`] event on `events`; spawn failures arrive
    /// as [`ProcessEventKind::Errored`].
    fn start(&self, destination: &Destination, events: EventSender) -> Box<dyn TranscoderProcess>;
}

/// A single encoder process instance.
///
/// Exactly one terminal event is emitted per instance, after which the
/// handle is inert and every write fails.
pub trait TranscoderProcess: Send + Sync {
    fn id(&self) -> ProcessId;

    /// Queue `chunk` for the encoder's input pipe without blocking.
    fn write(&self, chunk: Bytes) -> Result<(), WriteError>;

    /// Forcibly terminate the process. Idempotent.
    fn kill(&mut self);

    /// Whether the handle has been killed or has reported a terminal event.
    fn is_inert(&self) -> bool;
}

/// Errors from writing to an encoder's input pipe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("Encoder {0} has not started yet")]
    NotStarted(ProcessId),

    #[error("Encoder {0} is no longer running")]
    Inert(ProcessId),

    #[error("Encoder {0} input pipe is closed")]
    PipeClosed(ProcessId),

    #[error("Encoder {0} is not keeping up, input queue is full")]
    Backlogged(ProcessId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_ids_are_unique_and_increasing() {
        let a = ProcessId::next();
        let b = ProcessId::next();
        assert!(b > a);
        assert_eq!(a.to_string(), format!("enc-{}", a.get()));
    }

    #[test]
    fn only_started_is_non_terminal() {
        let started = ProcessEventKind::Started {
            command_line: String::new(),
        };
        assert!(!started.is_terminal());
        assert!(ProcessEventKind::Ended.is_terminal());
        assert!(ProcessEventKind::Errored("boom".into()).is_terminal());
    }
}

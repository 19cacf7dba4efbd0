//! The relay session state machine.
//!
//! Readiness is edge-triggered: chunks are only written once the encoder
//! reports [`ProcessEventKind::Started`]. Until then they are buffered, and
//! the buffer is drained exactly once at the `Starting -> Ready` transition.

use std::sync::Arc;

use bytes::Bytes;
use pipecast_core::SessionConfig;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::buffer::{ChunkBuffer, PushOutcome};
use crate::encoder::{
    Destination, EventSender, ProcessEvent, ProcessEventKind, ProcessId, Transcoder,
    TranscoderProcess,
};

use super::state::SessionState;
use super::types::{ChunkOutcome, ConnectionId, DropReason, SessionStats, StreamStatus};

/// Relay state for one client connection.
pub struct RelaySession {
    id: ConnectionId,
    transcoder: Arc<dyn Transcoder>,
    events: EventSender,
    config: SessionConfig,
    state: SessionState,
    destination: Option<Destination>,
    pending: ChunkBuffer,
    process: Option<Box<dyn TranscoderProcess>>,
    startup_deadline: Option<Instant>,
    stats: SessionStats,
}

impl RelaySession {
    /// Create an idle session. Encoder lifecycle events for this session's
    /// processes are delivered on `events`.
    pub fn new(
        id: ConnectionId,
        transcoder: Arc<dyn Transcoder>,
        events: EventSender,
        config: SessionConfig,
    ) -> Self {
        let pending = ChunkBuffer::with_cap(config.pending_cap(), config.overflow_policy);
        Self {
            id,
            transcoder,
            events,
            config,
            state: SessionState::Idle,
            destination: None,
            pending,
            process: None,
            startup_deadline: None,
            stats: SessionStats::default(),
        }
    }

    pub const fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Id of the current encoder process, if any.
    pub fn process_id(&self) -> Option<ProcessId> {
        self.process.as_ref().map(|p| p.id())
    }

    /// When a `Starting` session gives up waiting for readiness.
    pub const fn startup_deadline(&self) -> Option<Instant> {
        self.startup_deadline
    }

    /// Start streaming to `destination` with a fresh encoder.
    ///
    /// A process that is still starting or running is killed first; its
    /// late events are ignored.
    pub fn start(&mut self, destination: Destination) {
        if self.state.is_active() {
            info!(
                connection_id = %self.id,
                state = %self.state,
                "Restarting stream, discarding current encoder"
            );
        }
        self.discard_process(true);

        info!(connection_id = %self.id, destination = %destination, "Starting stream");
        let process = self.transcoder.start(&destination, self.events.clone());
        debug!(connection_id = %self.id, process_id = %process.id(), "Encoder requested");

        self.process = Some(process);
        self.destination = Some(destination);
        self.state = SessionState::Starting;
        self.startup_deadline = self.config.startup_timeout().map(|t| Instant::now() + t);
        self.stats.processes_started += 1;
    }

    /// Deliver one inbound media chunk.
    pub fn push_chunk(&mut self, chunk: Bytes) -> ChunkOutcome {
        match self.state {
            SessionState::Ready => self.write_chunk(chunk),
            SessionState::Starting => match self.pending.push(chunk) {
                Ok(PushOutcome::Buffered) => {
                    debug!(
                        connection_id = %self.id,
                        chunks = self.pending.len(),
                        bytes = self.pending.pending_bytes(),
                        "Buffering chunk, encoder not ready"
                    );
                    ChunkOutcome::Buffered
                }
                Ok(PushOutcome::BufferedAfterEviction(evicted)) => {
                    warn!(connection_id = %self.id, evicted, "Pending buffer full, dropped oldest chunks");
                    self.stats.chunks_dropped += evicted as u64;
                    ChunkOutcome::Buffered
                }
                Err(e) => {
                    warn!(connection_id = %self.id, error = %e, "Dropping chunk");
                    self.stats.chunks_dropped += 1;
                    ChunkOutcome::Dropped(DropReason::Overflow(e))
                }
            },
            SessionState::Idle | SessionState::Stopped | SessionState::Failed => {
                debug!(connection_id = %self.id, state = %self.state, "Dropping chunk, no active stream");
                self.stats.chunks_dropped += 1;
                ChunkOutcome::Dropped(DropReason::NoActiveStream)
            }
        }
    }

    fn write_chunk(&mut self, chunk: Bytes) -> ChunkOutcome {
        let Some(process) = self.process.as_ref() else {
            self.stats.chunks_dropped += 1;
            return ChunkOutcome::Dropped(DropReason::NoActiveStream);
        };
        let len = chunk.len() as u64;
        match process.write(chunk) {
            Ok(()) => {
                self.stats.chunks_relayed += 1;
                self.stats.bytes_relayed += len;
                ChunkOutcome::Written
            }
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Error writing to encoder stdin");
                self.stats.write_failures += 1;
                ChunkOutcome::WriteFailed(e)
            }
        }
    }

    /// Apply an encoder lifecycle event. Returns the status to report to
    /// the connection, if any.
    pub fn handle_process_event(&mut self, event: ProcessEvent) -> Option<StreamStatus> {
        if self.process_id() != Some(event.process) {
            debug!(
                connection_id = %self.id,
                process_id = %event.process,
                "Ignoring event from discarded encoder"
            );
            return None;
        }

        match event.kind {
            ProcessEventKind::Started { command_line } => {
                if self.state != SessionState::Starting {
                    return None;
                }
                debug!(connection_id = %self.id, command = %command_line, "Encoder ready");
                self.state = SessionState::Ready;
                self.startup_deadline = None;
                self.flush_pending();
                Some(StreamStatus::Started)
            }
            ProcessEventKind::Ended => {
                info!(connection_id = %self.id, "Encoder ended");
                self.discard_process(false);
                self.state = SessionState::Stopped;
                Some(StreamStatus::Ended)
            }
            ProcessEventKind::Errored(message) => {
                warn!(connection_id = %self.id, error = %message, "Encoder error");
                self.discard_process(false);
                self.state = SessionState::Failed;
                Some(StreamStatus::Error(message))
            }
        }
    }

    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let Some(process) = self.process.as_ref() else {
            return;
        };
        let mut relayed = 0u64;
        let mut bytes = 0u64;
        let mut failures = 0u64;
        let id = &self.id;
        let flushed = self.pending.drain_into(|chunk| {
            let len = chunk.len() as u64;
            match process.write(chunk) {
                Ok(()) => {
                    relayed += 1;
                    bytes += len;
                }
                Err(e) => {
                    warn!(connection_id = %id, error = %e, "Write error during flush");
                    failures += 1;
                }
            }
        });
        info!(connection_id = %self.id, chunks = flushed, bytes, "Flushed buffered chunks");
        self.stats.chunks_relayed += relayed;
        self.stats.bytes_relayed += bytes;
        self.stats.write_failures += failures;
    }

    /// Explicit `stop-stream`. Kills the encoder without waiting for it to
    /// finalize output.
    pub fn stop(&mut self) -> Option<StreamStatus> {
        if !self.state.is_active() {
            debug!(connection_id = %self.id, state = %self.state, "Stop with no active stream");
            return None;
        }
        info!(connection_id = %self.id, "Stopping stream manually");
        self.discard_process(true);
        self.state = SessionState::Stopped;
        Some(StreamStatus::Stopped)
    }

    /// Transport disconnect. Terminal for this session; never reported.
    pub fn disconnect(&mut self) {
        if self.process.is_some() {
            info!(connection_id = %self.id, state = %self.state, "Client disconnected, killing encoder");
        }
        self.discard_process(true);
        self.state = SessionState::Stopped;
    }

    /// Fail a `Starting` session whose readiness edge is overdue.
    pub fn check_startup_timeout(&mut self, now: Instant) -> Option<StreamStatus> {
        let deadline = self.startup_deadline?;
        if self.state != SessionState::Starting || now < deadline {
            return None;
        }
        let secs = self.config.startup_timeout_secs;
        warn!(connection_id = %self.id, timeout_secs = secs, "Encoder did not become ready in time");
        self.discard_process(true);
        self.state = SessionState::Failed;
        Some(StreamStatus::Error(format!("startup timed out after {secs}s")))
    }

    /// Drop the current process and anything buffered for it.
    fn discard_process(&mut self, kill: bool) {
        if let Some(mut process) = self.process.take() {
            if kill {
                process.kill();
            }
        }
        self.startup_deadline = None;
        let dropped = self.pending.clear();
        if dropped > 0 {
            debug!(connection_id = %self.id, chunks = dropped, "Discarded buffered chunks");
            self.stats.chunks_dropped += dropped as u64;
        }
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
    }
}

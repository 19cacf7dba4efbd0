//! Per-connection dispatch into the relay session.
//!
//! The socket task owns one [`RelayConnection`] and feeds it inbound events,
//! encoder lifecycle events and startup deadlines strictly one at a time.
//! Every returned status goes back to this connection only.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::encoder::{Destination, EventReceiver, ProcessEvent};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::session::{ChunkOutcome, ConnectionId, StreamStatus};

use super::protocol::InboundEvent;

pub struct RelayConnection {
    id: ConnectionId,
    registry: SessionRegistry,
    session: SessionHandle,
}

impl RelayConnection {
    /// Register a new connection with an idle session. The returned receiver
    /// yields lifecycle events of this connection's encoder processes.
    pub async fn open(registry: SessionRegistry) -> (Self, EventReceiver) {
        let id = ConnectionId::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = registry.get_or_create(&id, events_tx).await;
        info!(connection_id = %id, "Client connected");
        (
            Self {
                id,
                registry,
                session,
            },
            events_rx,
        )
    }

    pub const fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub const fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Dispatch one inbound protocol event.
    pub async fn handle(&self, event: InboundEvent) -> Option<StreamStatus> {
        let mut session = self.session.lock().await;
        match event {
            InboundEvent::StartStream(start) => {
                match Destination::new(&start.destination_base, &start.key) {
                    Ok(destination) => {
                        session.start(destination);
                        None
                    }
                    Err(e) => {
                        warn!(connection_id = %self.id, error = %e, "Rejected start-stream");
                        Some(StreamStatus::Error(format!("invalid destination: {e}")))
                    }
                }
            }
            InboundEvent::BinaryStream(chunk) => {
                if let ChunkOutcome::Dropped(reason) = session.push_chunk(chunk) {
                    debug!(connection_id = %self.id, ?reason, "Chunk not relayed");
                }
                None
            }
            InboundEvent::StopStream => session.stop(),
        }
    }

    /// Apply a lifecycle event from one of this connection's encoders.
    pub async fn on_process_event(&self, event: ProcessEvent) -> Option<StreamStatus> {
        self.session.lock().await.handle_process_event(event)
    }

    /// Deadline after which [`Self::on_startup_deadline`] should be called.
    pub async fn startup_deadline(&self) -> Option<Instant> {
        self.session.lock().await.startup_deadline()
    }

    pub async fn on_startup_deadline(&self) -> Option<StreamStatus> {
        self.session
            .lock()
            .await
            .check_startup_timeout(Instant::now())
    }

    /// Transport disconnect: kill the encoder and forget the session.
    pub async fn close(self) {
        self.registry.remove(&self.id).await;
        info!(connection_id = %self.id, "Client disconnected");
    }
}

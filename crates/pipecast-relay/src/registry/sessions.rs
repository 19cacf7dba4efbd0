//! In-memory registry of relay sessions.

use std::collections::HashMap;
use std::sync::Arc;

use pipecast_core::SessionConfig;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::encoder::{EventSender, Transcoder};
use crate::session::{ConnectionId, RelaySession};

/// Shared handle to one session. Holding the lock serializes every
/// transition for that connection.
pub type SessionHandle = Arc<Mutex<RelaySession>>;

/// Thread-safe map from connection to its relay session.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<ConnectionId, SessionHandle>>>,
    transcoder: Arc<dyn Transcoder>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(transcoder: Arc<dyn Transcoder>, config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            transcoder,
            config,
        }
    }

    /// Get the session for `id`, creating an idle one if absent. `events`
    /// is only used when a session is created.
    pub async fn get_or_create(&self, id: &ConnectionId, events: EventSender) -> SessionHandle {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.clone()).or_insert_with(|| {
            debug!(connection_id = %id, "Created session");
            Arc::new(Mutex::new(RelaySession::new(
                id.clone(),
                Arc::clone(&self.transcoder),
                events,
                self.config.clone(),
            )))
        });
        Arc::clone(session)
    }

    /// Get an existing session.
    pub async fn get(&self, id: &ConnectionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session, killing its encoder whatever state it is in.
    pub async fn remove(&self, id: &ConnectionId) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.lock().await.disconnect();
                info!(connection_id = %id, "Session removed");
                true
            }
            None => {
                debug!(connection_id = %id, "Tried to remove unknown session");
                false
            }
        }
    }

    /// Tear down every session. Used on server shutdown.
    pub async fn shutdown_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, session) in &drained {
            session.lock().await.disconnect();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Shut down all sessions");
        }
        drained.len()
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }
}

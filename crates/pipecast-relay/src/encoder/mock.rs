//! Scripted transcoder for exercising sessions without real processes.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::{
    Destination, EventSender, ProcessEvent, ProcessEventKind, ProcessId, Transcoder,
    TranscoderProcess, WriteError,
};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const INERT: u8 = 2;

/// Shared view of one mock process, kept by the test after the session owns
/// the handle.
#[derive(Debug)]
pub struct MockProcessState {
    pub id: ProcessId,
    pub destination_uri: String,
    phase: AtomicU8,
    writes: Mutex<Vec<Bytes>>,
    kills: AtomicUsize,
    /// Writes attempted while not running.
    premature_writes: AtomicUsize,
    events: EventSender,
}

impl MockProcessState {
    pub fn writes(&self) -> Vec<Bytes> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn premature_writes(&self) -> usize {
        self.premature_writes.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == RUNNING
    }

    /// Mark running and build the readiness event. Also sent on the
    /// session's event channel.
    pub fn fire_started(&self) -> ProcessEvent {
        let _ = self
            .phase
            .compare_exchange(PENDING, RUNNING, Ordering::SeqCst, Ordering::SeqCst);
        self.emit(ProcessEventKind::Started {
            command_line: format!("mock -i pipe:0 {}", self.destination_uri),
        })
    }

    pub fn fire_ended(&self) -> ProcessEvent {
        self.phase.store(INERT, Ordering::SeqCst);
        self.emit(ProcessEventKind::Ended)
    }

    pub fn fire_errored(&self, message: &str) -> ProcessEvent {
        self.phase.store(INERT, Ordering::SeqCst);
        self.emit(ProcessEventKind::Errored(message.to_string()))
    }

    /// Simulate a broken pipe: the process is alive but writes fail.
    pub fn break_pipe(&self) {
        self.phase.store(INERT, Ordering::SeqCst);
    }

    fn emit(&self, kind: ProcessEventKind) -> ProcessEvent {
        let event = ProcessEvent {
            process: self.id,
            kind,
        };
        let _ = self.events.send(event.clone());
        event
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockTranscoder {
    started: Arc<Mutex<Vec<Arc<MockProcessState>>>>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<Arc<MockProcessState>> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recently started process.
    #[allow(clippy::expect_used)]
    pub fn last(&self) -> Arc<MockProcessState> {
        self.started().pop().expect("no process started")
    }
}

impl Transcoder for MockTranscoder {
    fn start(&self, destination: &Destination, events: EventSender) -> Box<dyn TranscoderProcess> {
        let state = Arc::new(MockProcessState {
            id: ProcessId::next(),
            destination_uri: destination.uri(),
            phase: AtomicU8::new(PENDING),
            writes: Mutex::new(Vec::new()),
            kills: AtomicUsize::new(0),
            premature_writes: AtomicUsize::new(0),
            events,
        });
        if let Ok(mut started) = self.started.lock() {
            started.push(Arc::clone(&state));
        }
        Box::new(MockProcess { state })
    }
}

struct MockProcess {
    state: Arc<MockProcessState>,
}

impl TranscoderProcess for MockProcess {
    fn id(&self) -> ProcessId {
        self.state.id
    }

    fn write(&self, chunk: Bytes) -> Result<(), WriteError> {
        match self.state.phase.load(Ordering::SeqCst) {
            RUNNING => {
                if let Ok(mut writes) = self.state.writes.lock() {
                    writes.push(chunk);
                }
                Ok(())
            }
            PENDING => {
                self.state.premature_writes.fetch_add(1, Ordering::SeqCst);
                Err(WriteError::NotStarted(self.state.id))
            }
            _ => Err(WriteError::Inert(self.state.id)),
        }
    }

    fn kill(&mut self) {
        self.state.phase.store(INERT, Ordering::SeqCst);
        self.state.kills.fetch_add(1, Ordering::SeqCst);
    }

    fn is_inert(&self) -> bool {
        self.state.phase.load(Ordering::SeqCst) == INERT
    }
}

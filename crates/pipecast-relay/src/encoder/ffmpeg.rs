//! ffmpeg-backed encoder processes.
//!
//! The process is spawned on a background task so [`Transcoder::start`] never
//! waits on it. Media bytes travel through a channel to a dedicated stdin
//! writer task. Bytes queued but not yet written are capped by
//! `max_queued_bytes`; past it writes fail with [`WriteError::Backlogged`].
//! A broken pipe ends the writer task, every later write fails with
//! [`WriteError::PipeClosed`] and the process can no longer end cleanly.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use bytes::Bytes;
use pipecast_core::EncoderConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    Destination, EventSender, ProcessEvent, ProcessEventKind, ProcessId, Transcoder,
    TranscoderProcess, WriteError,
};

const PHASE_PENDING: u8 = 0;
const PHASE_RUNNING: u8 = 1;
const PHASE_INERT: u8 = 2;

/// Build the encoder argument list for `destination_uri`.
pub fn build_args(config: &EncoderConfig, destination_uri: &str) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];
    args.extend(config.input_options.iter().cloned());
    args.push("-i".to_string());
    args.push("pipe:0".to_string());
    args.extend(config.output_options.iter().cloned());
    args.push(destination_uri.to_string());
    args
}

/// Starts ffmpeg (or a compatible binary) reading from stdin.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    config: EncoderConfig,
}

impl FfmpegTranscoder {
    pub const fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

impl Transcoder for FfmpegTranscoder {
    fn start(&self, destination: &Destination, events: EventSender) -> Box<dyn TranscoderProcess> {
        Box::new(FfmpegProcess::spawn(&self.config, destination, events))
    }
}

/// Handle to one encoder process.
///
/// Dropping the handle kills the process.
#[derive(Debug)]
pub struct FfmpegProcess {
    id: ProcessId,
    phase: Arc<AtomicU8>,
    stdin_tx: mpsc::UnboundedSender<Bytes>,
    /// Bytes handed to the writer task and not yet written.
    queued: Arc<AtomicUsize>,
    max_queued: Option<usize>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl FfmpegProcess {
    /// Spawn the encoder in the background. Must be called within a Tokio
    /// runtime.
    pub fn spawn(config: &EncoderConfig, destination: &Destination, events: EventSender) -> Self {
        let id = ProcessId::next();
        let phase = Arc::new(AtomicU8::new(PHASE_PENDING));
        let queued = Arc::new(AtomicUsize::new(0));
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        let mut cmd = Command::new(&config.program);
        cmd.args(build_args(config, &destination.uri()))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let command_line = format!(
            "{} {}",
            config.program.display(),
            build_args(config, &destination.redacted()).join(" ")
        );

        let supervisor = Supervisor {
            id,
            phase: Arc::clone(&phase),
            queued: Arc::clone(&queued),
            events,
            stderr_tail_lines: config.stderr_tail_lines,
        };
        tokio::spawn(supervisor.run(cmd, command_line, stdin_rx, kill_rx));

        Self {
            id,
            phase,
            stdin_tx,
            queued,
            max_queued: config.queue_cap(),
            kill_tx: Some(kill_tx),
        }
    }

    fn enqueue(&self, chunk: Bytes) -> Result<(), WriteError> {
        let len = chunk.len();
        let queued = self.queued.fetch_add(len, Ordering::AcqRel);
        if self.max_queued.is_some_and(|max| queued + len > max) {
            self.queued.fetch_sub(len, Ordering::AcqRel);
            return Err(WriteError::Backlogged(self.id));
        }
        self.stdin_tx.send(chunk).map_err(|_| {
            self.queued.fetch_sub(len, Ordering::AcqRel);
            WriteError::PipeClosed(self.id)
        })
    }
}

impl TranscoderProcess for FfmpegProcess {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn write(&self, chunk: Bytes) -> Result<(), WriteError> {
        match self.phase.load(Ordering::Acquire) {
            PHASE_PENDING => Err(WriteError::NotStarted(self.id)),
            PHASE_RUNNING => self.enqueue(chunk),
            _ => Err(WriteError::Inert(self.id)),
        }
    }

    fn kill(&mut self) {
        self.phase.store(PHASE_INERT, Ordering::Release);
        if let Some(tx) = self.kill_tx.take() {
            debug!(process_id = %self.id, "Killing encoder");
            let _ = tx.send(());
        }
    }

    fn is_inert(&self) -> bool {
        self.phase.load(Ordering::Acquire) == PHASE_INERT
    }
}

/// Owns the child for its whole life and emits its lifecycle events.
struct Supervisor {
    id: ProcessId,
    phase: Arc<AtomicU8>,
    queued: Arc<AtomicUsize>,
    events: EventSender,
    stderr_tail_lines: usize,
}

enum Exit {
    Status(ExitStatus),
    WaitFailed(std::io::Error),
    Killed,
}

impl Supervisor {
    async fn run(
        self,
        mut cmd: Command,
        command_line: String,
        stdin_rx: mpsc::UnboundedReceiver<Bytes>,
        mut kill_rx: oneshot::Receiver<()>,
    ) {
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(process_id = %self.id, error = %e, "Failed to spawn encoder");
                self.finish(ProcessEventKind::Errored(format!("failed to spawn encoder: {e}")));
                return;
            }
        };

        let Some(stdin) = child.stdin.take() else {
            let _ = child.start_kill();
            self.finish(ProcessEventKind::Errored(
                "failed to capture encoder stdin".to_string(),
            ));
            return;
        };

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_stderr(self.id, stderr, self.stderr_tail_lines)));

        // A kill that raced the spawn leaves the phase inert.
        if self
            .phase
            .compare_exchange(PHASE_PENDING, PHASE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let _ = child.start_kill();
            let _ = child.wait().await;
            self.finish(ProcessEventKind::Errored("encoder killed before start".to_string()));
            return;
        }

        let (pipe_tx, mut pipe_rx) = oneshot::channel();
        tokio::spawn(write_stdin(
            self.id,
            stdin,
            stdin_rx,
            Arc::clone(&self.queued),
            pipe_tx,
        ));

        info!(process_id = %self.id, pid = ?child.id(), command = %command_line, "Encoder started");
        let _ = self.events.send(ProcessEvent {
            process: self.id,
            kind: ProcessEventKind::Started { command_line },
        });

        let exit = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Exit::Status(status),
                Err(e) => Exit::WaitFailed(e),
            },
            // Fires on an explicit kill and when the handle is dropped.
            _ = &mut kill_rx => {
                if let Err(e) = child.start_kill() {
                    debug!(process_id = %self.id, error = %e, "Encoder already gone at kill");
                }
                let _ = child.wait().await;
                Exit::Killed
            }
        };

        let tail = match stderr_task {
            Some(task) => collect_tail(task).await,
            None => Vec::new(),
        };

        let kind = match exit {
            Exit::Status(status) if status.success() => match pipe_rx.try_recv() {
                // Input was lost, so a zero exit status is not a clean end.
                Ok(e) => {
                    warn!(process_id = %self.id, error = %e, "Encoder exited after its input pipe closed");
                    ProcessEventKind::Errored(format!("encoder input pipe closed: {e}"))
                }
                Err(_) => {
                    info!(process_id = %self.id, "Encoder exited");
                    ProcessEventKind::Ended
                }
            },
            Exit::Status(status) => {
                warn!(process_id = %self.id, %status, stderr = ?tail, "Encoder exited abnormally");
                ProcessEventKind::Errored(exit_message(&status.to_string(), &tail))
            }
            Exit::WaitFailed(e) => {
                warn!(process_id = %self.id, error = %e, "Error waiting for encoder");
                ProcessEventKind::Errored(format!("failed to wait for encoder: {e}"))
            }
            Exit::Killed => {
                info!(process_id = %self.id, "Encoder killed");
                ProcessEventKind::Errored("encoder killed with SIGKILL".to_string())
            }
        };
        self.finish(kind);
    }

    fn finish(&self, kind: ProcessEventKind) {
        self.phase.store(PHASE_INERT, Ordering::Release);
        if self
            .events
            .send(ProcessEvent {
                process: self.id,
                kind,
            })
            .is_err()
        {
            debug!(process_id = %self.id, "Event receiver gone, dropping terminal event");
        }
    }
}

fn exit_message(status: &str, tail: &[String]) -> String {
    if tail.is_empty() {
        format!("encoder exited with {status}")
    } else {
        format!("encoder exited with {status}: {}", tail.join(" | "))
    }
}

/// Copy queued chunks into the encoder's stdin. A write failure is reported
/// on `failed` before the receiver is dropped.
async fn write_stdin(
    id: ProcessId,
    mut stdin: ChildStdin,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    queued: Arc<AtomicUsize>,
    failed: oneshot::Sender<std::io::Error>,
) {
    while let Some(chunk) = rx.recv().await {
        let result = stdin.write_all(&chunk).await;
        queued.fetch_sub(chunk.len(), Ordering::AcqRel);
        if let Err(e) = result {
            warn!(process_id = %id, error = %e, "Encoder stdin write failed, closing pipe");
            let _ = failed.send(e);
            return;
        }
    }
    if let Err(e) = stdin.shutdown().await {
        debug!(process_id = %id, error = %e, "Failed to close encoder stdin");
    }
    debug!(process_id = %id, "stdin writer finished");
}

async fn read_stderr(id: ProcessId, stderr: ChildStderr, keep: usize) -> Vec<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(keep);
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(process_id = %id, "stderr: {}", line);
        if keep == 0 {
            continue;
        }
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

/// Stderr hits EOF once the child is gone, unless a grandchild still holds
/// it open; don't let that stall the terminal event.
async fn collect_tail(task: JoinHandle<Vec<String>>) -> Vec<String> {
    match tokio::time::timeout(std::time::Duration::from_secs(1), task).await {
        Ok(Ok(tail)) => tail,
        _ => Vec::new(),
    }
}

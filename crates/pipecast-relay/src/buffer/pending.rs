//! FIFO of raw byte frames with an optional byte cap.

use std::collections::VecDeque;

use bytes::Bytes;
use pipecast_core::OverflowPolicy;

/// Ordered queue of chunks awaiting an encoder.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: VecDeque<Bytes>,
    bytes: usize,
    cap: Option<usize>,
    policy: OverflowPolicy,
}

/// Successful push result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Buffered,
    /// Buffered after evicting this many older chunks.
    BufferedAfterEviction(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("pending buffer full ({pending_bytes}/{cap} bytes), chunk of {chunk_bytes} bytes rejected")]
    Full {
        pending_bytes: usize,
        chunk_bytes: usize,
        cap: usize,
    },

    #[error("chunk of {chunk_bytes} bytes exceeds the pending buffer cap of {cap} bytes")]
    ChunkTooLarge { chunk_bytes: usize, cap: usize },
}

impl ChunkBuffer {
    /// Unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer holding at most `cap` bytes (`None` = unbounded).
    pub fn with_cap(cap: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            chunks: VecDeque::new(),
            bytes: 0,
            cap,
            policy,
        }
    }

    /// Append a chunk, applying the overflow policy when capped.
    pub fn push(&mut self, chunk: Bytes) -> Result<PushOutcome, BufferError> {
        let Some(cap) = self.cap else {
            self.append(chunk);
            return Ok(PushOutcome::Buffered);
        };

        if chunk.len() > cap {
            return Err(BufferError::ChunkTooLarge {
                chunk_bytes: chunk.len(),
                cap,
            });
        }

        if self.bytes + chunk.len() <= cap {
            self.append(chunk);
            return Ok(PushOutcome::Buffered);
        }

        match self.policy {
            OverflowPolicy::RejectNew => Err(BufferError::Full {
                pending_bytes: self.bytes,
                chunk_bytes: chunk.len(),
                cap,
            }),
            OverflowPolicy::DropOldest => {
                let mut evicted = 0;
                while self.bytes + chunk.len() > cap {
                    let Some(old) = self.chunks.pop_front() else {
                        break;
                    };
                    self.bytes -= old.len();
                    evicted += 1;
                }
                self.append(chunk);
                Ok(PushOutcome::BufferedAfterEviction(evicted))
            }
        }
    }

    fn append(&mut self, chunk: Bytes) {
        self.bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Hand every buffered chunk to `sink` in arrival order, leaving the
    /// buffer empty. Returns the number of chunks delivered.
    pub fn drain_into<F>(&mut self, mut sink: F) -> usize
    where
        F: FnMut(Bytes),
    {
        let count = self.chunks.len();
        self.bytes = 0;
        for chunk in self.chunks.drain(..) {
            sink(chunk);
        }
        count
    }

    /// Discard everything. Returns the number of chunks dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.chunks.len();
        self.chunks.clear();
        self.bytes = 0;
        count
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total bytes currently buffered.
    pub const fn pending_bytes(&self) -> usize {
        self.bytes
    }
}

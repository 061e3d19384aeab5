//! Chunk accumulation
//!
//! Collects the chunks of one transfer into a single growing buffer and turns
//! the transfer into a sequence of events: one per chunk, then exactly one
//! completion or failure. Cancelling the session token drops the transfer and
//! ends the sequence.

use crate::download::source::OpenedStream;
use crate::error::{Error, Result};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Download state of one track.
#[derive(Debug, Default)]
pub struct DownloadSession {
    buffer: Vec<u8>,
    chunks: usize,
    total_bytes: Option<u64>,
    cancelled: bool,
}

impl DownloadSession {
    pub fn new(total_bytes: Option<u64>) -> Self {
        let mut buffer = Vec::new();
        if let Some(total) = total_bytes {
            // Declared lengths can lie; cap the up-front reservation
            buffer.reserve(total.min(64 * 1024 * 1024) as usize);
        }
        Self {
            buffer,
            chunks: 0,
            total_bytes,
            cancelled: false,
        }
    }

    fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.chunks += 1;
    }

    pub fn received_bytes(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Mutable prefix for in-place size patching
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            received_bytes: self.received_bytes(),
            total_bytes: self.total_bytes,
        }
    }
}

/// Snapshot of transfer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received_bytes: u64,
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Percentage complete, or `None` when the total is unknown
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.received_bytes as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

/// One step of a transfer.
#[derive(Debug)]
pub enum ChunkEvent {
    Chunk(DownloadProgress),
    Completed(DownloadProgress),
    Failed(Error),
}

/// Drives one transfer into a `DownloadSession`.
pub struct ChunkAccumulator {
    body: Option<BoxStream<'static, Result<Bytes>>>,
    session: DownloadSession,
    cancel: CancellationToken,
}

impl ChunkAccumulator {
    pub fn new(opened: OpenedStream, cancel: CancellationToken) -> Self {
        Self {
            body: Some(opened.body),
            session: DownloadSession::new(opened.content_length),
            cancel,
        }
    }

    pub fn session(&self) -> &DownloadSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DownloadSession {
        &mut self.session
    }

    /// True once completion, failure or cancellation has been observed
    pub fn is_finished(&self) -> bool {
        self.body.is_none()
    }

    /// Next event of the transfer.
    ///
    /// Returns `None` after the terminal event or once cancelled. Cancel-safe:
    /// a chunk is only appended after it has been fully received.
    pub async fn next_event(&mut self) -> Option<ChunkEvent> {
        let body = self.body.as_mut()?;

        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            next = body.next() => Some(next),
        };

        let Some(next) = next else {
            debug!(
                "Transfer cancelled after {} bytes",
                self.session.received_bytes()
            );
            self.session.cancelled = true;
            self.body = None;
            return None;
        };

        match next {
            Some(Ok(chunk)) => {
                if !chunk.is_empty() {
                    self.session.append(&chunk);
                }
                Some(ChunkEvent::Chunk(self.session.progress()))
            }
            Some(Err(err)) => {
                warn!(
                    "Transfer failed after {} bytes: {}",
                    self.session.received_bytes(),
                    err
                );
                self.body = None;
                Some(ChunkEvent::Failed(err))
            }
            None => {
                info!(
                    "Transfer complete: {} bytes in {} chunks",
                    self.session.received_bytes(),
                    self.session.chunk_count()
                );
                self.body = None;
                Some(ChunkEvent::Completed(self.session.progress()))
            }
        }
    }
}

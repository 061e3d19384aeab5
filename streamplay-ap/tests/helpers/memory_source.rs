//! In-memory byte source
//!
//! Serves a fixed payload in fixed-size chunks, optionally slowed down or
//! failing part way, so sessions can be driven without a network.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamplay_ap::download::{ByteSource, OpenedStream};
use streamplay_ap::{Error, Result};

#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    chunk_size: usize,
    declare_length: bool,
    fail_after_chunks: Option<usize>,
    chunk_delay: Option<Duration>,
    opened: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            data: Bytes::from(data),
            chunk_size: chunk_size.max(1),
            declare_length: true,
            fail_after_chunks: None,
            chunk_delay: None,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Leave the total length undeclared
    pub fn without_length(mut self) -> Self {
        self.declare_length = false;
        self
    }

    /// Fail with a network error after `chunks` chunks
    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after_chunks = Some(chunks);
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn chunks(&self) -> Vec<Result<Bytes>> {
        let mut chunks: Vec<Result<Bytes>> = (0..self.data.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end = (start + self.chunk_size).min(self.data.len());
                Ok(self.data.slice(start..end))
            })
            .collect();

        if let Some(limit) = self.fail_after_chunks {
            chunks.truncate(limit);
            chunks.push(Err(Error::Network("connection reset by peer".to_string())));
        }
        chunks
    }
}

impl ByteSource for MemorySource {
    fn open<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<OpenedStream>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let content_length = self.declare_length.then_some(self.data.len() as u64);
        let chunks = futures::stream::iter(self.chunks());

        let body = match self.chunk_delay {
            Some(delay) => chunks
                .then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    chunk
                })
                .boxed(),
            None => chunks.boxed(),
        };

        async move {
            Ok(OpenedStream {
                content_length,
                body,
            })
        }
        .boxed()
    }
}

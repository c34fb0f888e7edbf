//! Streaming response pipeline.
//!
//! A [`Connector`] chains [`Pipe`] stages with bounded channels. Each stage
//! runs as its own task, reads chunks until its input closes, and closes its
//! output by returning. The caller's task drains the last channel and writes
//! each chunk to the destination as soon as it arrives.
//!
//! A stage that never returns keeps its output open and stalls
//! [`Connector::connect`] forever; stages are expected to finish once
//! [`Conduit::recv`] yields `None`.

use crate::error::PipeError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Immutable piece of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
}

impl Chunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Bytes> for Chunk {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

/// Channel pair handed to one stage.
pub struct Conduit {
    rx: mpsc::Receiver<Chunk>,
    tx: mpsc::Sender<Chunk>,
}

impl Conduit {
    /// Next chunk from upstream, or `None` once upstream is done.
    pub async fn recv(&mut self) -> Option<Chunk> {
        self.rx.recv().await
    }

    /// Forward a chunk downstream. Waits while downstream is full and
    /// returns false when downstream went away.
    pub async fn send(&self, chunk: Chunk) -> bool {
        self.tx.send(chunk).await.is_ok()
    }
}

/// One transformation stage.
#[async_trait]
pub trait Pipe: Send + Sync + 'static {
    /// Consume `conduit` until its input closes. Returning closes the output.
    async fn pipe(&self, conduit: Conduit);
}

/// Stage applying a function to every chunk.
pub struct MapPipe<F> {
    f: F,
}

#[async_trait]
impl<F> Pipe for MapPipe<F>
where
    F: Fn(Chunk) -> Chunk + Send + Sync + 'static,
{
    async fn pipe(&self, mut conduit: Conduit) {
        while let Some(chunk) = conduit.recv().await {
            if !conduit.send((self.f)(chunk)).await {
                return;
            }
        }
    }
}

/// Build a stage from a chunk mapping function.
pub fn map_pipe<F>(f: F) -> Arc<dyn Pipe>
where
    F: Fn(Chunk) -> Chunk + Send + Sync + 'static,
{
    Arc::new(MapPipe { f })
}

/// Ordered chain of stages between a reply body and its writer.
#[derive(Clone)]
pub struct Connector {
    pipes: Vec<Arc<dyn Pipe>>,
    capacity: usize,
}

impl Connector {
    /// `capacity` is the buffer size of every channel in the chain; values
    /// below one are raised to one.
    pub fn new(pipes: Vec<Arc<dyn Pipe>>, capacity: usize) -> Self {
        Self {
            pipes,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// Stream `data` through every stage into `writer`.
    ///
    /// Returns the number of bytes written. Fails with the first write error,
    /// along with the bytes written before it, or with the first stage that
    /// panicked.
    pub async fn connect<W>(&self, data: impl Into<Bytes>, writer: &mut W) -> Result<usize, PipeError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let data = data.into();

        if self.pipes.is_empty() {
            writer
                .write_all(&data)
                .await
                .map_err(|source| PipeError::Write { written: 0, source })?;
            writer
                .flush()
                .await
                .map_err(|source| PipeError::Write {
                    written: data.len(),
                    source,
                })?;
            return Ok(data.len());
        }

        let (source, mut rx) = mpsc::channel::<Chunk>(self.capacity);
        let mut stages = Vec::with_capacity(self.pipes.len());

        for pipe in &self.pipes {
            let (tx, next) = mpsc::channel::<Chunk>(self.capacity);
            let conduit = Conduit { rx, tx };
            let pipe = Arc::clone(pipe);
            stages.push(tokio::spawn(async move { pipe.pipe(conduit).await }));
            rx = next;
        }

        // The source channel is empty, so the seed never waits.
        let _ = source.send(Chunk::from(data)).await;
        drop(source);

        debug!(stages = self.pipes.len(), "Pipeline connected");

        let mut written = 0;
        while let Some(chunk) = rx.recv().await {
            writer
                .write_all(&chunk.data)
                .await
                .map_err(|source| PipeError::Write { written, source })?;
            written += chunk.len();
        }

        // A stage that died closed its output early, leaving the body short.
        for (stage, handle) in stages.into_iter().enumerate() {
            handle
                .await
                .map_err(|source| PipeError::Stage { stage, source })?;
        }

        writer
            .flush()
            .await
            .map_err(|source| PipeError::Write { written, source })?;

        Ok(written)
    }
}

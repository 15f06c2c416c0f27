//! A single named output channel and its consumer registry

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use super::pipe::ConsumerPipe;
use crate::error::{Result, StreamError, StreamKind};
use crate::io::{AbortSignal, Abortable};
use crate::transform::ChunkWriter;

type Sink = Abortable<Box<dyn AsyncWrite + Send + Unpin>>;

struct Registry {
    closed: bool,
    writers: Vec<Sink>,
}

/// Duplicates every write to all currently registered sinks.
///
/// The registry lock is held for the whole broadcast, so a sink added while a
/// write is in flight only sees the writes that start after it was added. A
/// sink that does not keep up stalls the producer; nothing is dropped.
/// [`close`](Broadcaster::close) cuts such a stalled broadcast short.
#[derive(Clone)]
pub struct Broadcaster {
    kind: StreamKind,
    registry: Arc<Mutex<Registry>>,
    closing: AbortSignal,
}

impl Broadcaster {
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            registry: Arc::new(Mutex::new(Registry {
                closed: false,
                writers: Vec::new(),
            })),
            closing: AbortSignal::new(),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub async fn is_closed(&self) -> bool {
        self.registry.lock().await.closed
    }

    /// Number of sinks currently receiving broadcasts.
    pub async fn len(&self) -> usize {
        self.registry.lock().await.writers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Register an arbitrary sink.
    pub async fn add_writer<W>(&self, writer: W) -> Result<()>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut registry = self.registry.lock().await;
        if registry.closed || self.closing.is_aborted() {
            return Err(StreamError::ChannelClosed(self.kind));
        }
        registry.writers.push(self.closing.wrap(Box::new(writer)));
        Ok(())
    }

    /// Create a pipe buffering up to `capacity` bytes and register its write end.
    pub async fn add_consumer(&self, capacity: usize) -> Result<ConsumerPipe> {
        let (writer, reader) = tokio::io::duplex(capacity.max(1));
        self.add_writer(writer).await?;
        debug!(stream = %self.kind, capacity, "Registered consumer pipe");
        Ok(ConsumerPipe::new(reader))
    }

    /// Write `data` to every sink concurrently.
    ///
    /// Sinks whose write fails are evicted; the broadcast itself only fails
    /// once the channel is closed, including when the close arrives while
    /// this write is waiting on a full sink.
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        let mut registry = self.registry.lock().await;
        if registry.closed || self.closing.is_aborted() {
            return Err(StreamError::ChannelClosed(self.kind));
        }
        if data.is_empty() || registry.writers.is_empty() {
            return Ok(data.len());
        }

        let results = join_all(registry.writers.iter_mut().map(|writer| async move {
            writer.write_all(data).await?;
            writer.flush().await
        }))
        .await;

        if self.closing.is_aborted() {
            return Err(StreamError::ChannelClosed(self.kind));
        }

        let kind = self.kind;
        let mut outcomes = results.into_iter();
        registry.writers.retain(|_| match outcomes.next() {
            Some(Err(err)) => {
                debug!(stream = %kind, error = %err, "Evicting consumer after failed write");
                false
            }
            _ => true,
        });

        Ok(data.len())
    }

    /// Close the channel and shut every sink down.
    ///
    /// A broadcast blocked on a consumer that stopped reading is failed
    /// first, so closing never waits on a reader. Closing twice is a no-op.
    /// All shutdown failures are reported together.
    pub async fn close(&self) -> Result<()> {
        self.closing.abort();
        let writers = {
            let mut registry = self.registry.lock().await;
            if registry.closed {
                return Ok(());
            }
            registry.closed = true;
            std::mem::take(&mut registry.writers)
        };

        let results = join_all(writers.into_iter().map(|mut writer| async move {
            writer.get_mut().shutdown().await
        }))
        .await;

        let failures = results
            .into_iter()
            .filter_map(|result| result.err())
            .map(|err| err.to_string())
            .collect();
        StreamError::from_failures(failures)
    }
}

#[async_trait]
impl ChunkWriter for Broadcaster {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.write(chunk).await.map_err(StreamError::into_io)
    }
}

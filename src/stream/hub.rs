use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::wait::CompletionGroup;
use crate::broadcast::{Broadcaster, ConsumerPipe};
use crate::config::HubOptions;
use crate::error::{Result, StreamError, StreamKind};
use crate::io::{AbortSignal, Abortable, BoxedReader, BoxedWriter, IoHandle};

/// Writer end of a hub's stdin; whatever is written here reaches the process.
pub type StdinPipe = Abortable<BoxedWriter>;

#[derive(Default)]
struct StdinState {
    reader: Option<Abortable<BoxedReader>>,
    pipe: Option<StdinPipe>,
}

/// Owns the stdout and stderr channels and the stdin pipe of one process.
///
/// Consumers may be added before or while the process runs. Once the process
/// has been reaped, [`close_streams`](StreamHub::close_streams) tears all of
/// it down.
pub struct StreamHub {
    pub(super) options: HubOptions,
    pub(super) stdout: Broadcaster,
    pub(super) stderr: Broadcaster,
    stdin: StdMutex<StdinState>,
    stdin_closed: AbortSignal,
    pub(super) io: Mutex<Option<IoHandle>>,
    pub(super) group: CompletionGroup,
}

impl StreamHub {
    pub fn new(options: HubOptions) -> Self {
        Self {
            options,
            stdout: Broadcaster::new(StreamKind::Stdout),
            stderr: Broadcaster::new(StreamKind::Stderr),
            stdin: StdMutex::new(StdinState::default()),
            stdin_closed: AbortSignal::new(),
            io: Mutex::new(None),
            group: CompletionGroup::new(),
        }
    }

    pub fn options(&self) -> &HubOptions {
        &self.options
    }

    pub fn channel(&self, kind: StreamKind) -> Option<&Broadcaster> {
        match kind {
            StreamKind::Stdout => Some(&self.stdout),
            StreamKind::Stderr => Some(&self.stderr),
            StreamKind::Stdin => None,
        }
    }

    pub async fn stdout_pipe(&self) -> Result<ConsumerPipe> {
        self.add_consumer(StreamKind::Stdout).await
    }

    pub async fn stderr_pipe(&self) -> Result<ConsumerPipe> {
        self.add_consumer(StreamKind::Stderr).await
    }

    /// Register a new consumer pipe on an output channel.
    pub async fn add_consumer(&self, kind: StreamKind) -> Result<ConsumerPipe> {
        let channel = self.channel(kind).ok_or(StreamError::NotBroadcast(kind))?;
        channel.add_consumer(self.options.pipe_capacity).await
    }

    /// Create the stdin pipe. Its writer is handed out by
    /// [`take_stdin_pipe`](StreamHub::take_stdin_pipe), its reader is drained
    /// into the process once I/O is attached.
    pub fn init_stdin(&self) {
        let (writer, reader) = tokio::io::duplex(self.options.pipe_capacity.max(1));
        let mut stdin = self.stdin_state();
        stdin.pipe = Some(self.stdin_closed.wrap(Box::new(writer) as BoxedWriter));
        stdin.reader = Some(self.stdin_closed.wrap(Box::new(reader) as BoxedReader));
    }

    /// For processes that never read stdin: writes are accepted and dropped.
    pub fn discard_stdin(&self) {
        let mut stdin = self.stdin_state();
        stdin.pipe = Some(self.stdin_closed.wrap(Box::new(tokio::io::sink()) as BoxedWriter));
        stdin.reader = None;
    }

    /// Hand out the stdin writer. Returns `None` if stdin was never
    /// initialised or the pipe was already taken.
    pub fn take_stdin_pipe(&self) -> Option<StdinPipe> {
        self.stdin_state().pipe.take()
    }

    pub(super) fn take_stdin_reader(&self) -> Option<Abortable<BoxedReader>> {
        self.stdin_state().reader.take()
    }

    fn stdin_state(&self) -> MutexGuard<'_, StdinState> {
        self.stdin.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close stdin and both channels.
    ///
    /// Every failure is collected; the combined error lists one line per
    /// stream that failed to close.
    pub async fn close_streams(&self) -> Result<()> {
        let mut failures = Vec::new();

        let pipe = self.stdin_state().pipe.take();
        if let Some(mut pipe) = pipe {
            if let Err(err) = pipe.shutdown().await {
                failures.push(format!("error close stdin: {err}"));
            }
        }
        // Ends the stdin copy even when the caller still holds the pipe.
        self.stdin_closed.abort();
        self.stdin_state().reader = None;

        for channel in [&self.stdout, &self.stderr] {
            if let Err(err) = channel.close().await {
                failures.push(format!("error close {}: {err}", channel.kind()));
            }
        }

        debug!(failures = failures.len(), "Closed process streams");
        StreamError::from_failures(failures)
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new(HubOptions::default())
    }
}

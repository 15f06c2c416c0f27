//! The process I/O collaborator: stream endpoints plus abort/wait/close

pub mod abort;
pub mod child;
pub mod mock;

pub use abort::{AbortSignal, Abortable};
pub use child::ChildController;
pub use mock::{ControllerCall, MockController, MockIo};

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle operations of whatever backs a process's streams.
#[async_trait]
pub trait IoController: Send + Sync {
    /// Force the backend down so that blocked stream operations return.
    async fn abort(&self) -> io::Result<()>;

    /// Wait until the backend has acknowledged shutdown.
    async fn wait(&self) -> io::Result<()>;

    /// Release the backend's resources.
    async fn close(&self) -> io::Result<()>;
}

/// Stream endpoints of one process together with its controller.
pub struct ProcessIo {
    stdin: Option<BoxedWriter>,
    stdout: Option<BoxedReader>,
    stderr: Option<BoxedReader>,
    controller: Arc<dyn IoController>,
}

impl ProcessIo {
    pub fn new(controller: Arc<dyn IoController>) -> Self {
        Self {
            stdin: None,
            stdout: None,
            stderr: None,
            controller,
        }
    }

    pub fn with_stdin(mut self, stdin: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(stdin));
        self
    }

    pub fn with_stdout(mut self, stdout: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(stdout));
        self
    }

    pub fn with_stderr(mut self, stderr: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(stderr));
        self
    }

    pub fn has_stdin(&self) -> bool {
        self.stdin.is_some()
    }

    /// Split into abortable endpoints and the handle that aborts them.
    pub(crate) fn into_parts(self) -> (IoParts, IoHandle) {
        let signal = AbortSignal::new();
        let parts = IoParts {
            stdin: self.stdin.map(|w| signal.wrap(w)),
            stdout: self.stdout.map(|r| signal.wrap(r)),
            stderr: self.stderr.map(|r| signal.wrap(r)),
        };
        let handle = IoHandle {
            controller: self.controller,
            signal,
        };
        (parts, handle)
    }
}

pub(crate) struct IoParts {
    pub stdin: Option<Abortable<BoxedWriter>>,
    pub stdout: Option<Abortable<BoxedReader>>,
    pub stderr: Option<Abortable<BoxedReader>>,
}

/// Control side of an attached [`ProcessIo`].
#[derive(Clone)]
pub struct IoHandle {
    controller: Arc<dyn IoController>,
    signal: AbortSignal,
}

impl IoHandle {
    /// Fail every attached endpoint, then abort the backend itself.
    pub async fn abort(&self) -> io::Result<()> {
        self.signal.abort();
        self.controller.abort().await
    }

    pub async fn wait(&self) -> io::Result<()> {
        self.controller.wait().await
    }

    pub async fn close(&self) -> io::Result<()> {
        self.controller.close().await
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}

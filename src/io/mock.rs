//! In-memory process I/O for tests

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::DuplexStream;

use super::{IoController, ProcessIo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCall {
    Abort,
    Wait,
    Close,
}

/// Controller that records every call it receives.
#[derive(Clone, Default)]
pub struct MockController {
    call_history: Arc<Mutex<Vec<ControllerCall>>>,
    fail_abort: Arc<AtomicBool>,
}

impl MockController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `abort` calls fail after being recorded.
    pub fn fail_abort(&self) {
        self.fail_abort.store(true, Ordering::SeqCst);
    }

    pub fn verify_called(&self, call: ControllerCall, times: usize) -> bool {
        self.history().iter().filter(|c| **c == call).count() == times
    }

    pub fn get_call_history(&self) -> Vec<ControllerCall> {
        self.history().clone()
    }

    pub fn reset(&self) {
        self.history().clear();
    }

    fn history(&self) -> MutexGuard<'_, Vec<ControllerCall>> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IoController for MockController {
    async fn abort(&self) -> io::Result<()> {
        self.history().push(ControllerCall::Abort);
        if self.fail_abort.load(Ordering::SeqCst) {
            return Err(io::Error::other("mock abort failure"));
        }
        Ok(())
    }

    async fn wait(&self) -> io::Result<()> {
        self.history().push(ControllerCall::Wait);
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        self.history().push(ControllerCall::Close);
        Ok(())
    }
}

/// The far ends of a [`ProcessIo`] built from in-memory pipes.
///
/// Bytes written to `stdout`/`stderr` are what the process "printed"; bytes
/// read from `stdin` are what was delivered to it.
pub struct MockIo {
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    stdin: Option<DuplexStream>,
    controller: MockController,
}

impl MockIo {
    /// Stdout and stderr only, each pipe buffering `capacity` bytes.
    pub fn new(capacity: usize) -> (MockIo, ProcessIo) {
        Self::build(capacity, false)
    }

    /// Like [`MockIo::new`], with a stdin pipe as well.
    pub fn with_stdin(capacity: usize) -> (MockIo, ProcessIo) {
        Self::build(capacity, true)
    }

    fn build(capacity: usize, stdin: bool) -> (MockIo, ProcessIo) {
        let controller = MockController::new();
        let (stdout_tx, stdout_rx) = tokio::io::duplex(capacity);
        let (stderr_tx, stderr_rx) = tokio::io::duplex(capacity);

        let mut io = ProcessIo::new(Arc::new(controller.clone()))
            .with_stdout(stdout_rx)
            .with_stderr(stderr_rx);

        let mut stdin_rx = None;
        if stdin {
            let (tx, rx) = tokio::io::duplex(capacity);
            io = io.with_stdin(tx);
            stdin_rx = Some(rx);
        }

        let mock = MockIo {
            stdout: Some(stdout_tx),
            stderr: Some(stderr_tx),
            stdin: stdin_rx,
            controller,
        };
        (mock, io)
    }

    pub fn controller(&self) -> &MockController {
        &self.controller
    }

    pub fn take_stdout(&mut self) -> Option<DuplexStream> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<DuplexStream> {
        self.stderr.take()
    }

    pub fn take_stdin(&mut self) -> Option<DuplexStream> {
        self.stdin.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_controller_records_calls() {
        let controller = MockController::new();
        controller.abort().await.unwrap();
        controller.wait().await.unwrap();
        controller.close().await.unwrap();

        assert_eq!(
            controller.get_call_history(),
            vec![ControllerCall::Abort, ControllerCall::Wait, ControllerCall::Close]
        );
        assert!(controller.verify_called(ControllerCall::Abort, 1));

        controller.reset();
        assert!(controller.verify_called(ControllerCall::Abort, 0));
    }

    #[tokio::test]
    async fn test_failing_abort_is_still_recorded() {
        let controller = MockController::new();
        controller.fail_abort();
        assert!(controller.abort().await.is_err());
        assert!(controller.verify_called(ControllerCall::Abort, 1));
    }

    #[tokio::test]
    async fn test_abort_failure_is_shared_between_clones() {
        let controller = MockController::new();
        let handed_out = controller.clone();
        assert!(handed_out.abort().await.is_ok());

        controller.fail_abort();
        assert!(handed_out.abort().await.is_err());
        assert!(controller.verify_called(ControllerCall::Abort, 2));
    }

    #[test]
    fn test_stdin_pipe_is_optional() {
        let (mut without, io) = MockIo::new(16);
        assert!(!io.has_stdin());
        assert!(without.take_stdin().is_none());

        let (mut with, io) = MockIo::with_stdin(16);
        assert!(io.has_stdin());
        assert!(with.take_stdin().is_some());
    }
}

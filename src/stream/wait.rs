//! Waiting for the copy tasks, with cancellation

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use super::hub::StreamHub;

#[derive(Default)]
struct GroupState {
    active: AtomicUsize,
    done: Notify,
}

/// Counts running tasks; [`wait`](CompletionGroup::wait) resolves at zero.
#[derive(Clone, Default)]
pub struct CompletionGroup {
    state: Arc<GroupState>,
}

impl CompletionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more task until the returned guard is dropped.
    pub fn enter(&self) -> CompletionGuard {
        self.state.active.fetch_add(1, Ordering::SeqCst);
        CompletionGuard {
            state: Arc::clone(&self.state),
        }
    }

    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.state.done.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent release cannot be missed.
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Held by a counted task for as long as it runs, panics included.
pub struct CompletionGuard {
    state: Arc<GroupState>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.state.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.done.notify_waiters();
        }
    }
}

impl StreamHub {
    /// Wait for the stdout and stderr copies to finish, or for `cancel`.
    ///
    /// If `cancel` resolves first the attached I/O is aborted, waited for and
    /// closed, and this returns without waiting for the copies to wind down.
    /// Failures along the way are logged; cancellation always counts as done.
    pub async fn wait<F>(&self, cancel: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = self.group.wait() => {
                debug!("Stream copies finished");
            }
            _ = cancel => {
                self.force_abort().await;
            }
        }
    }

    /// [`wait`](StreamHub::wait) with an optional deadline.
    pub async fn wait_timeout(&self, timeout: Option<Duration>) {
        match timeout {
            Some(timeout) => self.wait(tokio::time::sleep(timeout)).await,
            None => self.wait(std::future::pending()).await,
        }
    }

    /// Number of output copies still running.
    pub fn active_copies(&self) -> usize {
        self.group.active()
    }

    async fn force_abort(&self) {
        let Some(io) = self.io.lock().await.take() else {
            debug!("Wait cancelled with no I/O attached");
            return;
        };

        debug!(active = self.group.active(), "Wait cancelled, aborting process I/O");
        if let Err(err) = io.abort().await {
            warn!(error = %err, "Failed to abort process I/O");
        }
        if let Err(err) = io.wait().await {
            warn!(error = %err, "Failed to wait for aborted process I/O");
        }
        if let Err(err) = io.close().await {
            warn!(error = %err, "Failed to close process I/O");
        }
    }
}

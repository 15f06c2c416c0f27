//! Out-of-band abort for in-flight reads and writes

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::task::AtomicWaker;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::debug;

#[derive(Default)]
struct SignalState {
    aborted: AtomicBool,
    wakers: Mutex<Vec<Arc<AtomicWaker>>>,
}

impl SignalState {
    fn wakers(&self) -> MutexGuard<'_, Vec<Arc<AtomicWaker>>> {
        self.wakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One-shot signal that fails every [`Abortable`] created from it.
///
/// Firing the signal wakes any task parked on a wrapped stream, which then
/// sees `ConnectionAborted` instead of waiting on the inner stream.
#[derive(Clone, Default)]
pub struct AbortSignal {
    state: Arc<SignalState>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Fire the signal. Later calls do nothing.
    pub fn abort(&self) {
        if self.state.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        let wakers = std::mem::take(&mut *self.state.wakers());
        debug!(streams = wakers.len(), "Aborting wrapped streams");
        for waker in wakers {
            waker.wake();
        }
    }

    /// Wrap a reader or writer so that it fails once the signal fires.
    pub fn wrap<T>(&self, inner: T) -> Abortable<T> {
        let waker = Arc::new(AtomicWaker::new());
        if !self.is_aborted() {
            self.state.wakers().push(Arc::clone(&waker));
        }
        Abortable {
            inner,
            signal: self.clone(),
            waker,
        }
    }

    fn forget(&self, waker: &Arc<AtomicWaker>) {
        self.state.wakers().retain(|w| !Arc::ptr_eq(w, waker));
    }
}

/// A stream tied to an [`AbortSignal`].
pub struct Abortable<T> {
    inner: T,
    signal: AbortSignal,
    waker: Arc<AtomicWaker>,
}

impl<T> Abortable<T> {
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }

    /// Register the task and report whether the signal has fired.
    fn poll_aborted(&self, cx: &Context<'_>) -> bool {
        self.waker.register(cx.waker());
        self.signal.is_aborted()
    }
}

impl<T> Drop for Abortable<T> {
    fn drop(&mut self) {
        self.signal.forget(&self.waker);
    }
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "stream aborted")
}

impl<T: AsyncRead + Unpin> AsyncRead for Abortable<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_aborted(cx) {
            return Poll::Ready(Err(aborted()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Abortable<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.poll_aborted(cx) {
            return Poll::Ready(Err(aborted()));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_aborted(cx) {
            return Poll::Ready(Err(aborted()));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_aborted(cx) {
            return Poll::Ready(Err(aborted()));
        }
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

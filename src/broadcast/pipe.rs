use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, DuplexStream, ReadBuf};

/// Read end of a bounded pipe registered with a [`Broadcaster`].
///
/// The write end belongs to the channel. Once `capacity` unread bytes sit in
/// the pipe, the channel's next broadcast waits for this reader.
///
/// [`Broadcaster`]: super::Broadcaster
#[derive(Debug)]
pub struct ConsumerPipe {
    inner: DuplexStream,
}

impl ConsumerPipe {
    pub(crate) fn new(inner: DuplexStream) -> Self {
        Self { inner }
    }

    /// Stop consuming. The channel evicts this pipe on its next broadcast.
    pub fn close(self) {
        drop(self);
    }
}

impl AsyncRead for ConsumerPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

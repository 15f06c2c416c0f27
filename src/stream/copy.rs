//! Copy tasks between the process I/O and the hub

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, warn};

use super::hub::StreamHub;
use crate::broadcast::Broadcaster;
use crate::config::StreamRules;
use crate::io::{Abortable, BoxedReader, BoxedWriter, ProcessIo};
use crate::transform::{AsyncWriteSink, ChunkWriter, RuleSet, TransformWriter};

/// Pump `reader` through `writer` until end of stream, then flush it.
///
/// Returns the number of bytes read. On error the writer is left unflushed.
pub async fn copy_transformed<R, W>(
    reader: &mut R,
    writer: &mut TransformWriter<W>,
    buffer_size: usize,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: ChunkWriter,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;
    Ok(total)
}

impl StreamHub {
    /// Start copying the streams of `io` and keep its handle for [`wait`].
    ///
    /// One counted task per output stream present on `io`. If the hub has a
    /// stdin reader and `io` accepts input, an uncounted task feeds it.
    ///
    /// [`wait`]: StreamHub::wait
    pub async fn attach(&self, io: ProcessIo, rules: &StreamRules) {
        let (parts, handle) = io.into_parts();
        *self.io.lock().await = Some(handle);

        if let Some(stdout) = parts.stdout {
            self.spawn_output(stdout, self.stdout.clone(), rules.stdout.clone());
        }
        if let Some(stderr) = parts.stderr {
            self.spawn_output(stderr, self.stderr.clone(), rules.stderr.clone());
        }

        match (self.take_stdin_reader(), parts.stdin) {
            (Some(reader), Some(sink)) => self.spawn_stdin(reader, sink, rules.stdin.clone()),
            (Some(_), None) => debug!("Process has no stdin, hub stdin is not forwarded"),
            _ => {}
        }

        debug!(active = self.group.active(), "Attached process I/O");
    }

    fn spawn_output(
        &self,
        mut source: Abortable<BoxedReader>,
        channel: Broadcaster,
        rules: RuleSet,
    ) {
        let guard = self.group.enter();
        let lookback = rules.lookback_for(self.options.lookback);
        let buffer_size = self.options.copy_buffer_size;

        tokio::spawn(async move {
            let _guard = guard;
            let kind = channel.kind();
            let mut writer = TransformWriter::new(channel, rules, lookback);

            match copy_transformed(&mut source, &mut writer, buffer_size).await {
                Ok(bytes) => debug!(stream = %kind, bytes, "Stream copy finished"),
                Err(err) if err.kind() == io::ErrorKind::ConnectionAborted => {
                    debug!(stream = %kind, "Stream copy aborted")
                }
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(stream = %kind, "Channel closed during copy")
                }
                Err(err) => error!(stream = %kind, error = %err, "Error copying stream"),
            }
        });
    }

    fn spawn_stdin(
        &self,
        mut reader: Abortable<BoxedReader>,
        sink: Abortable<BoxedWriter>,
        rules: RuleSet,
    ) {
        let lookback = rules.lookback_for(self.options.lookback);
        let buffer_size = self.options.copy_buffer_size;

        tokio::spawn(async move {
            let mut writer = TransformWriter::new(AsyncWriteSink::new(sink), rules, lookback);

            match copy_transformed(&mut reader, &mut writer, buffer_size).await {
                Ok(bytes) => debug!(stream = "stdin", bytes, "Stream copy finished"),
                Err(err) if err.kind() == io::ErrorKind::ConnectionAborted => {
                    debug!(stream = "stdin", "Stream copy aborted")
                }
                Err(err) => error!(stream = "stdin", error = %err, "Error copying stream"),
            }

            if let Err(err) = writer.get_mut().get_mut().shutdown().await {
                if err.kind() != io::ErrorKind::ConnectionAborted {
                    warn!(error = %err, "Error closing process stdin");
                }
            }
        });
    }
}

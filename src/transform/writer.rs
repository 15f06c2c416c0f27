//! Applying rules to a stream that arrives in arbitrary chunks

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use super::rules::{RuleSet, Transformation};

/// Default lookback, long enough for any pattern up to 100 bytes.
pub const DEFAULT_LOOKBACK: usize = 100;

/// Downstream of a [`TransformWriter`]: accepts one whole chunk per call.
#[async_trait]
pub trait ChunkWriter: Send {
    /// Write all of `chunk`, returning the number of bytes accepted.
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize>;
}

#[async_trait]
impl ChunkWriter for Vec<u8> {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(chunk);
        Ok(chunk.len())
    }
}

#[async_trait]
impl<T: ChunkWriter + ?Sized> ChunkWriter for Box<T> {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize> {
        (**self).write_chunk(chunk).await
    }
}

/// Adapts any `AsyncWrite` into a [`ChunkWriter`].
pub struct AsyncWriteSink<W> {
    inner: W,
}

impl<W> AsyncWriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Send + Unpin> ChunkWriter for AsyncWriteSink<W> {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.inner.write_all(chunk).await?;
        self.inner.flush().await?;
        Ok(chunk.len())
    }
}

/// Committed bytes a stage keeps in front of its pending ones, enough for
/// look-behind over one UTF-8 character.
const LEFT_CONTEXT: usize = 4;

/// One rule of the pipeline with the bytes it is still holding back.
///
/// `buf[..context]` was already committed and is only kept so that `\b`, `^`
/// and friends see the real preceding bytes; `buf[context..]` is pending.
#[derive(Debug)]
struct Stage {
    rule: Transformation,
    buf: Vec<u8>,
    context: usize,
}

impl Stage {
    fn new(rule: Transformation) -> Self {
        Self {
            rule,
            buf: Vec::new(),
            context: 0,
        }
    }

    fn pending(&self) -> &[u8] {
        &self.buf[self.context..]
    }

    /// Accept `input` and emit everything that can no longer be part of a
    /// match starting in the last `lookback` bytes.
    fn push(&mut self, input: &[u8], lookback: usize, out: &mut Vec<u8>) {
        self.buf.extend_from_slice(input);
        let boundary = self.context + self.pending().len().saturating_sub(lookback);
        self.commit(boundary, out);
    }

    /// Accept `input` and emit everything. The next input starts a new stream.
    fn finish(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.buf.extend_from_slice(input);
        self.commit(self.buf.len(), out);
        self.buf.clear();
        self.context = 0;
    }

    fn commit(&mut self, boundary: usize, out: &mut Vec<u8>) {
        if boundary <= self.context {
            return;
        }
        let committed = self
            .rule
            .replace_committed(&self.buf, self.context, boundary, out);
        let keep_from = committed.saturating_sub(LEFT_CONTEXT);
        self.buf.drain(..keep_from);
        self.context = committed - keep_from;
    }
}

/// Applies a [`RuleSet`] to a byte stream written in arbitrary chunks.
///
/// Every rule runs as its own stage and holds back at most `lookback`
/// not-yet-forwarded bytes, so a match split across two writes is still
/// found as long as `lookback` is at least the longest span a pattern can
/// match. Held-back bytes are never forwarded twice. Look-behind assertions
/// see the bytes already forwarded, and a match is only committed once at
/// least one byte after it is known, so `\b` and `$` behave as they would on
/// the whole stream. A match that keeps growing up to the newest byte is
/// held back in full, which can exceed `lookback` for unbounded patterns.
///
/// The last bytes of a stream stay held back until [`flush`] is called;
/// dropping the writer without flushing discards them (a warning is logged).
///
/// [`flush`]: TransformWriter::flush
pub struct TransformWriter<W> {
    inner: W,
    stages: Vec<Stage>,
    lookback: usize,
}

impl<W> TransformWriter<W> {
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Bytes accepted but not yet forwarded downstream.
    pub fn buffered(&self) -> usize {
        self.stages.iter().map(|s| s.pending().len()).sum()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: ChunkWriter> TransformWriter<W> {
    pub fn new(inner: W, rules: RuleSet, lookback: usize) -> Self {
        if let Some(longest) = rules.lookback_hint() {
            if longest > lookback {
                warn!(
                    lookback,
                    longest,
                    "Lookback is shorter than the longest pattern, split matches may be missed"
                );
            }
        }

        Self {
            inner,
            stages: rules.iter().cloned().map(Stage::new).collect(),
            lookback,
        }
    }

    /// Writer with [`DEFAULT_LOOKBACK`], widened to the longest literal rule.
    pub fn with_default_lookback(inner: W, rules: RuleSet) -> Self {
        let lookback = rules.lookback_for(DEFAULT_LOOKBACK);
        Self::new(inner, rules, lookback)
    }

    /// Transform `chunk` and forward whatever became final, in at most one
    /// downstream write. Returns `chunk.len()`: every byte is either
    /// forwarded or held back.
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        if self.stages.is_empty() {
            self.forward(chunk).await?;
            return Ok(chunk.len());
        }

        let mut carry = chunk.to_vec();
        for stage in &mut self.stages {
            let mut out = Vec::with_capacity(carry.len());
            stage.push(&carry, self.lookback, &mut out);
            carry = out;
        }

        self.forward(&carry).await?;
        Ok(chunk.len())
    }

    /// Drain every held-back byte through the remaining rules and forward it.
    /// The writer can be reused afterwards.
    pub async fn flush(&mut self) -> io::Result<()> {
        let mut carry = Vec::new();
        for stage in &mut self.stages {
            let mut out = Vec::with_capacity(carry.len() + stage.pending().len());
            stage.finish(&carry, &mut out);
            carry = out;
        }
        self.forward(&carry).await
    }

    async fn forward(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.inner.write_chunk(bytes).await?;
        Ok(())
    }
}

impl<W> Drop for TransformWriter<W> {
    fn drop(&mut self) {
        let discarded = self.buffered();
        if discarded > 0 {
            warn!(
                bytes = discarded,
                "Transform writer dropped without flush, discarding held-back bytes"
            );
        }
    }
}

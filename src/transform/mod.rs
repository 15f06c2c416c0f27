//! In-flight text substitution for byte streams
//!
//! [`apply_all`] rewrites a complete buffer; [`TransformWriter`] produces the
//! same result for a stream written in arbitrary chunks, provided it is
//! flushed at end of stream.

pub mod rules;
pub mod writer;

pub use rules::{apply_all, RuleSet, Transformation};
pub use writer::{AsyncWriteSink, ChunkWriter, TransformWriter, DEFAULT_LOOKBACK};

//! # procstreams
//!
//! Standard-stream plumbing for a running process: capture stdout and stderr,
//! rewrite the bytes in flight, fan each stream out to any number of readers
//! and wait for the copies with a deadline that aborts the process I/O.
//!
//! ## Modules
//!
//! - `transform` - Substitution rules and the chunk-boundary-safe writer
//! - `broadcast` - Output channels fanning out to consumer pipes with backpressure
//! - `stream` - The per-process hub, its copy tasks and the cancellable wait
//! - `io` - The process I/O collaborator, abort signal, child adapter and mock
//! - `config` - Serde configuration for rules and buffer sizing
//! - `error` - Crate error type
pub mod broadcast;
pub mod config;
pub mod error;
pub mod io;
pub mod stream;
pub mod transform;

pub use broadcast::{Broadcaster, ConsumerPipe};
pub use config::{HubOptions, RuleConfig, StreamConfig, StreamRules};
pub use error::{Result, StreamError, StreamKind};
pub use io::{IoController, IoHandle, ProcessIo};
pub use stream::{StdinPipe, StreamHub};
pub use transform::{apply_all, RuleSet, TransformWriter, Transformation};

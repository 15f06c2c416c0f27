//! Per-process stream plumbing: capture, transform, fan out and wait

pub mod copy;
pub mod hub;
pub mod wait;


pub use copy::copy_transformed;
pub use hub::{StdinPipe, StreamHub};
pub use wait::{CompletionGroup, CompletionGuard};

//! Fan-out of one producer's bytes to any number of consumers

pub mod channel;
pub mod pipe;

pub use channel::Broadcaster;
pub use pipe::ConsumerPipe;

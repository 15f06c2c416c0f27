use std::fmt;
use std::io;

use thiserror::Error;

/// One logical direction of a process's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdin => "stdin",
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Pattern {0:?} matches the empty string")]
    EmptyMatch(String),

    #[error("{0} channel is closed")]
    ChannelClosed(StreamKind),

    #[error("{0} has a single consumer and does not fan out")]
    NotBroadcast(StreamKind),

    #[error("{}", .failures.join("\n"))]
    Close { failures: Vec<String> },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StreamError {
    /// Aggregate collected close failures, if there were any.
    pub fn from_failures(failures: Vec<String>) -> Result<()> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StreamError::Close { failures })
        }
    }

    /// Convert into an `io::Error` for the byte-copy paths.
    pub fn into_io(self) -> io::Error {
        match self {
            StreamError::Io(err) => err,
            StreamError::ChannelClosed(_) => io::Error::new(io::ErrorKind::BrokenPipe, self),
            other => io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

//! Common test utilities and helpers

#![allow(dead_code)]

use procstreams::{RuleSet, Transformation};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test output for the current thread.
pub fn init_test_tracing() -> DefaultGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("procstreams=debug"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(subscriber)
}

pub fn literal_rules(pairs: &[(&str, &str)]) -> RuleSet {
    pairs
        .iter()
        .map(|(search, replacement)| Transformation::literal(search, replacement).unwrap())
        .collect()
}

pub async fn read_all(reader: &mut (impl AsyncRead + Unpin)) -> String {
    let mut out = String::new();
    reader.read_to_string(&mut out).await.unwrap();
    out
}

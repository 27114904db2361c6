use std::io;
use thiserror::Error;

/// The small set of error kinds a fail-open caller might want to match on.
///
/// Every other failure (subprocess, regex, serialization) crosses the
/// boundary as `anyhow::Error` with `.context(...)` and is converted to a
/// logged default at the call site — never propagated to the host.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("state document is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to acquire lock on {path}: {source}")]
    LockFailed { path: String, source: io::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
}

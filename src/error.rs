use std::fmt;
use std::io;

/// Unified error type for the storage engine.
#[derive(Debug)]
pub enum Error {
    /// IO error from disk operations (write, read, rename, delete).
    Io(io::Error),
    /// An on-disk table is structurally invalid (bad magic, truncated
    /// record, index pointing outside the data section, ...).
    Corruption(String),
    /// The caller broke an API contract, e.g. asked a tombstone for its
    /// payload or fed unsorted cells to a table writer.
    InvalidState(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Corruption(msg) => write!(f, "Corruption: {msg}"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

use std::fmt;
use std::io;

use omen_core::CoreError;

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Sqlite(rusqlite::Error),
    Core(CoreError),
    RulesetNotFound(String),
    RulesetCorrupt {
        file: String,
        line: usize,
        reason: String,
    },
    SessionNotFound(String),
    Settings(String),
    InvalidData(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::Core(e) => write!(f, "{e}"),
            StoreError::RulesetNotFound(name) => write!(f, "ruleset '{name}' not found"),
            StoreError::RulesetCorrupt { file, line, reason } if *line > 0 => {
                write!(f, "corrupt ruleset file {file} at line {line}: {reason}")
            }
            StoreError::RulesetCorrupt { file, reason, .. } => {
                write!(f, "corrupt ruleset file {file}: {reason}")
            }
            StoreError::SessionNotFound(name) => write!(f, "session '{name}' not found"),
            StoreError::Settings(msg) => write!(f, "invalid settings: {msg}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Sqlite(e) => Some(e),
            StoreError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        StoreError::Core(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

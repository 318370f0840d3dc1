use std::fmt;

/// Errors raised by the pure engine.
///
/// Training surfaces these immediately so that no partial ruleset is ever
/// handed to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Empty or degenerate training input.
    InsufficientData(String),
    /// The alphabet has no usable symbols.
    EmptyAlphabet,
    /// Invalid parameter combination.
    Configuration(String),
    /// A session was recorded against a different ruleset.
    SessionMismatch {
        session: String,
        expected: String,
        found: String,
    },
    /// A cursor does not describe a reachable engine state for this model.
    InvalidCursor(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InsufficientData(msg) => write!(f, "insufficient training data: {msg}"),
            CoreError::EmptyAlphabet => write!(f, "alphabet has no usable symbols"),
            CoreError::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            CoreError::SessionMismatch {
                session,
                expected,
                found,
            } => write!(
                f,
                "session '{session}' was saved against ruleset {expected} \
                 but the current ruleset is {found}; the ruleset was retrained or replaced"
            ),
            CoreError::InvalidCursor(msg) => write!(f, "invalid session cursor: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

pub type Result<T> = std::result::Result<T, CoreError>;

use std::path::PathBuf;

use thiserror::Error;

use crate::cursor::ParseError;

/// Everything that can go wrong while resolving or evaluating late-bound code.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A dotted-path segment could not be found, even after trying to load a module.
    #[error("unresolved symbol: {path}")]
    UnresolvedSymbol { path: String },

    /// A multi-statement block was evaluated without naming what to extract,
    /// or the named target does not exist after execution.
    #[error("missing target: {0}")]
    MissingTarget(String),

    /// The code fragment does not parse.
    #[error("parse error: {0}")]
    Parse(String),

    /// The code fragment raised while executing.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// `set_value` could not reach or write the parent of the final segment.
    #[error("cannot assign {path}: {reason}")]
    Assignment { path: String, reason: String },

    /// A value that cannot act as a lookup scope was used as one.
    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("failed to read module {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EvalError {
    pub fn unresolved(path: impl Into<String>) -> Self {
        EvalError::UnresolvedSymbol { path: path.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        EvalError::Runtime(message.into())
    }

    pub fn assignment(path: impl Into<String>, reason: impl Into<String>) -> Self {
        EvalError::Assignment {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, EvalError::UnresolvedSymbol { .. })
    }
}

impl From<ParseError> for EvalError {
    fn from(e: ParseError) -> Self {
        EvalError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;

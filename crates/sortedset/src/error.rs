use std::fmt;
use std::io;

use thiserror::Error;

/// Which fetch found nothing; carried by [`SortedSetError::NoSuchElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    First,
    Last,
    Next,
}

impl FetchKind {
    /// Stable diagnostic code for logs and callers matching on text.
    pub fn code(self) -> &'static str {
        match self {
            FetchKind::First => "FETCH_FIRST_ELEMENT_ERROR",
            FetchKind::Last => "FETCH_LAST_ELEMENT_ERROR",
            FetchKind::Next => "FETCH_NEXT_ELEMENT_ERROR",
        }
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum SortedSetError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("no such element ({0})")]
    NoSuchElement(FetchKind),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A freshly written file did not read back as written.
    #[error("verification failed: {0}")]
    Verification(String),

    /// Every handle factory was exhausted.
    #[error("persist failed: {0}")]
    PersistFailed(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("corrupt file: {0}")]
    Corrupt(String),
}

impl SortedSetError {
    /// Failures of a single handle that another attempt may not repeat.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SortedSetError::Io(_) | SortedSetError::Verification(_) | SortedSetError::Corrupt(_)
        )
    }

    pub(crate) fn persisted(op: &str) -> Self {
        SortedSetError::IllegalState(format!(
            "cannot {op} a persisted set; call load() first"
        ))
    }
}

pub type Result<T> = std::result::Result<T, SortedSetError>;

use std::path::PathBuf;
use thiserror::Error;

pub type ChainResult<T> = Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Malformed info record: {0}")]
    MalformedRecord(String),
    #[error("Cannot create step {id}: {reason}")]
    StepCreation { id: usize, reason: String },
    #[error("Step {id} produced no recognizable outcome and no '{artifact}' artifact")]
    InvariantViolation { id: usize, artifact: String },
    #[error("No seed step found under '{}'", .0.display())]
    EmptyChain(PathBuf),
    #[error(transparent)]
    LogFormat(#[from] LogFormatError),
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChainError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ChainError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A log line carried a known label but did not match its grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{grammar} line does not match: '{line}'")]
pub struct LogFormatError {
    pub grammar: &'static str,
    pub line: String,
}

impl LogFormatError {
    pub fn new(grammar: &'static str, line: &str) -> Self {
        Self {
            grammar,
            line: line.trim().to_string(),
        }
    }
}

use std::error::Error as StdError;
use std::fmt;

use qed_core::Range;

/// A command the prover rejected, with the error location translated to
/// document coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailValue {
    pub message: String,
    pub range: Range,
}

/// Errors surfaced by [`StateMachine`](super::StateMachine) operations.
#[derive(Debug)]
pub enum StmError {
    /// The prover rejected a command. The machine rewound to a consistent
    /// state and keeps running.
    Fail(FailValue),
    /// The awaited request was interrupted.
    Interrupted,
    /// The machine was disposed and refuses all operations.
    Disposed,
    /// An internal invariant broke; the machine disposed itself.
    Inconsistent(String),
    /// The transport failed in a way the machine cannot recover from.
    Backend(anyhow::Error),
}

impl fmt::Display for StmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StmError::Fail(fail) => {
                write!(f, "command rejected at {}: {}", fail.range, fail.message)
            }
            StmError::Interrupted => write!(f, "request interrupted"),
            StmError::Disposed => write!(f, "the machine has been disposed"),
            StmError::Inconsistent(message) => write!(f, "{message}"),
            StmError::Backend(err) => write!(f, "prover transport error: {err}"),
        }
    }
}

impl StdError for StmError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StmError::Backend(err) => err.source(),
            _ => None,
        }
    }
}

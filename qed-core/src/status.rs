use std::fmt;

/// Lifecycle of a sentence as reported by the prover.
///
/// A sentence starts out as [`ProcessingInput`](Status::ProcessingInput) the
/// moment it is accepted and moves to whatever the prover reports afterwards.
/// [`Error`](Status::Error) is terminal for the sentence but does not remove it
/// from the document model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    ProcessingInput,
    Processed,
    Incomplete,
    Complete,
    InProgress,
    Error,
}

impl Status {
    #[inline]
    pub fn is_error(self) -> bool {
        matches!(self, Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::ProcessingInput => "processing-input",
            Status::Processed => "processed",
            Status::Incomplete => "incomplete",
            Status::Complete => "complete",
            Status::InProgress => "in-progress",
            Status::Error => "error",
        };
        write!(f, "{s}")
    }
}

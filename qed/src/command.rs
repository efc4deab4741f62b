use std::fmt;

use qed_core::{Point, Range};

/// One candidate sentence produced by the parser: the exact text and the
/// document range it covers.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    pub range: Range,
}

impl Command {
    pub fn new(text: impl Into<String>, range: Range) -> Self {
        Self { text: text.into(), range }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} @ {}", self.text, self.range)
    }
}

/// Factory for the lazy sequence of candidate sentences starting at an anchor.
///
/// The machine advances the iterator one command ahead of the in-flight
/// request so parsing overlaps with prover I/O, and restarts it from a fresh
/// anchor whenever the focus jumps non-contiguously.
pub trait CommandSource {
    fn commands(&mut self, start: Point, end: Option<Point>)
        -> Box<dyn Iterator<Item = Command> + '_>;
}

use std::time::Instant;

use qed_core::{Point, Range, Status, TextChange};

use crate::coqtop::StateId;
use crate::tree::SentenceId;

/// One accepted or in-progress prover command: its exact text, the document
/// range it covered at submission time, and the state the prover assigned it.
#[derive(Debug)]
pub struct Sentence {
    state_id: StateId,
    text: String,
    range: Range,
    status: Status,
    error: Option<ErrorInfo>,
    started_at: Instant,
    pub(crate) parent: Option<SentenceId>,
    /// Children ordered by range start, so a pre-order walk yields the
    /// timeline of accepted commands.
    pub(crate) children: Vec<SentenceId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ErrorInfo {
    pub message: String,
    /// Error sub-range in document coordinates, when the prover located it.
    pub range: Option<Range>,
}

/// Diagnostic payload for one errored sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceError {
    pub sentence_range: Range,
    pub error_range: Range,
    pub message: String,
}

impl Sentence {
    pub(crate) fn new(
        state_id: StateId,
        text: String,
        range: Range,
        started_at: Instant,
        parent: SentenceId,
    ) -> Self {
        Self {
            state_id,
            text,
            range,
            status: Status::ProcessingInput,
            error: None,
            started_at,
            parent: Some(parent),
            children: Vec::new(),
        }
    }

    /// The root sentence: no text, zero range, nothing left to process.
    pub(crate) fn root(state_id: StateId) -> Self {
        Self {
            state_id,
            text: String::new(),
            range: Range::default(),
            status: Status::Processed,
            error: None,
            started_at: Instant::now(),
            parent: None,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn state_id(&self) -> StateId {
        self.state_id
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn range(&self) -> Range {
        self.range
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    #[inline]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    #[inline]
    pub fn parent(&self) -> Option<SentenceId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[SentenceId] {
        &self.children
    }

    #[inline]
    pub fn is_before(&self, pos: Point) -> bool {
        self.range.is_before(pos)
    }

    #[inline]
    pub fn contains(&self, pos: Point) -> bool {
        self.range.contains(pos)
    }

    pub(crate) fn error_info(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        if self.status.is_error() && !status.is_error() {
            tracing::trace!(state_id = %self.state_id, %status, "ignoring status update for errored sentence");
            return;
        }
        self.status = status;
    }

    pub(crate) fn set_error(&mut self, message: String, range: Option<Range>) {
        self.status = Status::Error;
        self.error = Some(ErrorInfo { message, range });
    }

    /// Apply a batch of edits sorted by start descending and already filtered
    /// to those starting before this sentence's end. Edits entirely at or
    /// before the sentence start shift it; anything overlapping the interior
    /// invalidates it. Returns whether the sentence was invalidated.
    pub(crate) fn apply_changes(&mut self, changes: &[TextChange]) -> bool {
        debug_assert!(
            changes.windows(2).all(|w| w[0].range.start() >= w[1].range.start()),
            "changes must be sorted by start descending"
        );

        for change in changes {
            debug_assert!(change.range.start() < self.range.end());
            if change.range.end() <= self.range.start() {
                let delta = change.delta();
                self.range = delta.translate_range(self.range);
                if let Some(error) = &mut self.error {
                    if let Some(range) = &mut error.range {
                        *range = delta.translate_range(*range);
                    }
                }
            } else {
                tracing::debug!(
                    state_id = %self.state_id,
                    range = %self.range,
                    change = ?change,
                    "sentence invalidated by edit"
                );
                return true;
            }
        }

        false
    }
}

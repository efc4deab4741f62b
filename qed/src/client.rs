use qed_core::{Range, Status};

use crate::coqtop::{LtacProfResults, MessageLevel};

/// A client to the editor: the decoration and notification callbacks the
/// machine invokes as sentences change. Implementations must not call back
/// into the machine.
pub trait CoqClient: Send {
    /// A sentence's status changed; repaint its range.
    fn sentence_status(&mut self, range: Range, status: Status);

    /// A sentence was cancelled; drop its decorations.
    fn clear_sentence(&mut self, range: Range);

    /// The prover reported an error inside a sentence.
    fn sentence_error(&mut self, sentence_range: Range, error_range: Range, message: &str);

    /// A free-form prover message.
    fn message(&mut self, level: MessageLevel, text: &str);

    /// Profiling results for the sentence covering `range` (zero range for
    /// global results).
    fn ltac_prof_results(&mut self, range: Range, results: &LtacProfResults);

    /// The prover died or the machine hit an unrecoverable fault.
    fn coq_died(&mut self, error: Option<&str>);
}

impl<C: CoqClient + ?Sized> CoqClient for Box<C> {
    #[inline]
    fn sentence_status(&mut self, range: Range, status: Status) {
        self.as_mut().sentence_status(range, status)
    }

    #[inline]
    fn clear_sentence(&mut self, range: Range) {
        self.as_mut().clear_sentence(range)
    }

    #[inline]
    fn sentence_error(&mut self, sentence_range: Range, error_range: Range, message: &str) {
        self.as_mut().sentence_error(sentence_range, error_range, message)
    }

    #[inline]
    fn message(&mut self, level: MessageLevel, text: &str) {
        self.as_mut().message(level, text)
    }

    #[inline]
    fn ltac_prof_results(&mut self, range: Range, results: &LtacProfResults) {
        self.as_mut().ltac_prof_results(range, results)
    }

    #[inline]
    fn coq_died(&mut self, error: Option<&str>) {
        self.as_mut().coq_died(error)
    }
}

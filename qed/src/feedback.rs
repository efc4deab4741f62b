use qed_core::Status;

use crate::coqtop::StateId;

/// A status record that arrived before its state-id was known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BufferedStatus {
    pub state_id: StateId,
    pub status: Status,
    pub worker: Option<String>,
}

/// Holds status feedback for unknown state-ids until the add that introduces
/// them completes. New ids only ever become known at add completion, so that
/// is the single drain point; records still unknown then are dropped.
#[derive(Debug, Default)]
pub(crate) struct FeedbackBuffer {
    pending: Vec<BufferedStatus>,
}

impl FeedbackBuffer {
    pub fn push(&mut self, record: BufferedStatus) {
        tracing::debug!(state_id = %record.state_id, status = %record.status, "buffering feedback for unknown state");
        self.pending.push(record);
    }

    pub fn drain(&mut self) -> Vec<BufferedStatus> {
        std::mem::take(&mut self.pending)
    }
}
